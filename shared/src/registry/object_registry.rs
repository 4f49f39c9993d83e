use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use log::{debug, warn};

use crate::{
    events::topics::{ObjectEventPayload, ADD_GAME_OBJECT, DELETE_GAME_OBJECT},
    object::object_kinds::build_checked,
    EntityId, EntityRef, EventBus, KindError, MutChannel, ObjectKinds, OrphanWaitlist,
    PropertyMutator, RegistryError, Replicate, ReplicateBuilder, SyncContext, TypedRef,
};

/// Proof that an object was taken out of the tree. Hand it back to
/// [`ObjectRegistry::attach`] to place the object somewhere else.
#[must_use = "a detached object stays a root until attached"]
#[derive(Debug)]
pub struct Detached {
    identifier: EntityId,
}

impl Detached {
    pub fn identifier(&self) -> &EntityId {
        &self.identifier
    }
}

struct RegistryInner {
    objects: HashMap<EntityId, EntityRef>,
    by_alias: HashMap<&'static str, Vec<EntityId>>,
    parents: HashMap<EntityId, EntityId>,
    children: HashMap<EntityId, Vec<EntityId>>,
    kinds: ObjectKinds,
    waitlist: OrphanWaitlist,
    tombstones: HashSet<EntityId>,
    tombstone_order: VecDeque<EntityId>,
    tombstone_capacity: usize,
    removals: Vec<EntityId>,
}

impl RegistryInner {
    /// Records `identifier` as destroyed, forgetting the oldest tombstone
    /// once over capacity. Objects still waiting for it stay roots.
    fn tombstone(&mut self, identifier: &EntityId) {
        let orphans = self.waitlist.take_children(identifier);
        if !orphans.is_empty() {
            debug!(
                "Parent {} destroyed, {} waiting object(s) stay roots",
                identifier,
                orphans.len()
            );
        }
        if !self.tombstones.insert(identifier.clone()) {
            return;
        }
        self.tombstone_order.push_back(identifier.clone());
        while self.tombstone_order.len() > self.tombstone_capacity {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }
}

/// The single per-peer index of live replicated objects, keyed by
/// identifier and by type tag, plus the parent/child tree between them.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ObjectRegistry {
    inner: Rc<RefCell<RegistryInner>>,
    mutations: MutChannel,
    bus: EventBus,
}

impl ObjectRegistry {
    /// Destroyed identifiers remembered before the oldest are forgotten
    pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 65_536;

    pub fn new(bus: &EventBus) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                objects: HashMap::new(),
                by_alias: HashMap::new(),
                parents: HashMap::new(),
                children: HashMap::new(),
                kinds: ObjectKinds::new(),
                waitlist: OrphanWaitlist::new(),
                tombstones: HashSet::new(),
                tombstone_order: VecDeque::new(),
                tombstone_capacity: Self::DEFAULT_TOMBSTONE_CAPACITY,
                removals: Vec::new(),
            })),
            mutations: MutChannel::new(),
            bus: bus.clone(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // Kinds

    /// # Panics
    ///
    /// Panics if the kind's type tag is already registered.
    pub fn register_kind<T: ReplicateBuilder>(&self) {
        self.inner.borrow_mut().kinds.add_kind::<T>();
    }

    pub fn try_register_kind<T: ReplicateBuilder>(&self) -> Result<(), KindError> {
        self.inner.borrow_mut().kinds.try_add_kind::<T>()
    }

    /// # Panics
    ///
    /// Panics if `alias_name` is already registered.
    pub fn register_factory<F>(&self, alias_name: &'static str, factory: F)
    where
        F: Fn(EntityId) -> Box<dyn Replicate> + 'static,
    {
        if let Err(error) = self.try_register_factory(alias_name, factory) {
            panic!("{}", error);
        }
    }

    pub fn try_register_factory<F>(&self, alias_name: &'static str, factory: F) -> Result<(), KindError>
    where
        F: Fn(EntityId) -> Box<dyn Replicate> + 'static,
    {
        self.inner
            .borrow_mut()
            .kinds
            .try_add_factory(alias_name, factory)
    }

    pub fn has_kind(&self, alias_name: &str) -> bool {
        self.inner.borrow().kinds.contains(alias_name)
    }

    // Adding

    /// Registers a locally created object. It is announced with
    /// `ADD_GAME_OBJECT` and queued for replication.
    ///
    /// # Panics
    ///
    /// Panics if the identifier was destroyed, or is registered under
    /// another kind.
    pub fn add<T: Replicate>(&self, object: T) -> TypedRef<T> {
        match self.try_add(object) {
            Ok(typed) => typed,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn try_add<T: Replicate>(&self, object: T) -> Result<TypedRef<T>, RegistryError> {
        let identifier = object.identifier().to_string();
        let alias_name = object.alias_name();
        let entity = self.try_add_boxed(Box::new(object))?;
        entity
            .downcast::<T>()
            .ok_or(RegistryError::KindMismatch {
                identifier,
                alias_name,
            })
    }

    /// Adds a boxed object. Adding an identifier that is already registered
    /// applies the new object's values to the existing one instead.
    pub fn try_add_boxed(&self, object: Box<dyn Replicate>) -> Result<EntityRef, RegistryError> {
        self.try_add_entity(object, None)
    }

    /// Adds `object` as the last child of `parent`. The object is already
    /// linked when `ADD_GAME_OBJECT` fires.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not registered, or if adding fails.
    pub fn add_child<T: Replicate>(&self, parent: &EntityId, object: T) -> TypedRef<T> {
        match self.try_add_child(parent, object) {
            Ok(typed) => typed,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn try_add_child<T: Replicate>(
        &self,
        parent: &EntityId,
        object: T,
    ) -> Result<TypedRef<T>, RegistryError> {
        if !self.contains(parent) {
            return Err(RegistryError::ObjectNotFound {
                identifier: parent.to_string(),
            });
        }
        let identifier = object.identifier().to_string();
        let alias_name = object.alias_name();
        let entity = self.try_add_entity(Box::new(object), Some(parent))?;
        entity
            .downcast::<T>()
            .ok_or(RegistryError::KindMismatch {
                identifier,
                alias_name,
            })
    }

    // Lookup

    pub fn get(&self, identifier: &EntityId) -> Option<EntityRef> {
        self.inner.borrow().objects.get(identifier).cloned()
    }

    pub fn get_typed<T: Replicate>(&self, identifier: &EntityId) -> Option<TypedRef<T>> {
        self.get(identifier)?.downcast::<T>()
    }

    pub fn contains(&self, identifier: &EntityId) -> bool {
        self.inner.borrow().objects.contains_key(identifier)
    }

    /// Every live object with type tag `alias_name`, in registration order
    pub fn get_objects(&self, alias_name: &str) -> Vec<EntityRef> {
        let inner = self.inner.borrow();
        let Some(identifiers) = inner.by_alias.get(alias_name) else {
            return Vec::new();
        };
        identifiers
            .iter()
            .filter_map(|identifier| inner.objects.get(identifier).cloned())
            .collect()
    }

    pub fn get_objects_of<T: ReplicateBuilder>(&self) -> Vec<TypedRef<T>> {
        self.get_objects(T::SCHEMA.alias_name)
            .iter()
            .filter_map(|entity| entity.downcast::<T>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().objects.is_empty()
    }

    pub fn is_destroyed(&self, identifier: &EntityId) -> bool {
        self.inner.borrow().tombstones.contains(identifier)
    }

    pub fn tombstone_count(&self) -> usize {
        self.inner.borrow().tombstones.len()
    }

    /// Bounds how many destroyed identifiers are remembered. The oldest are
    /// forgotten first and could be registered again afterwards.
    pub fn set_tombstone_capacity(&self, capacity: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.tombstone_capacity = capacity;
        while inner.tombstone_order.len() > capacity {
            if let Some(oldest) = inner.tombstone_order.pop_front() {
                inner.tombstones.remove(&oldest);
            }
        }
    }

    // Tree

    pub fn parent_of(&self, identifier: &EntityId) -> Option<EntityId> {
        self.inner.borrow().parents.get(identifier).cloned()
    }

    pub fn children_of(&self, identifier: &EntityId) -> Vec<EntityId> {
        self.inner
            .borrow()
            .children
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }

    pub fn children_of_type<T: Replicate>(&self, identifier: &EntityId) -> Vec<TypedRef<T>> {
        self.children_of(identifier)
            .iter()
            .filter_map(|child| self.get_typed::<T>(child))
            .collect()
    }

    /// Object ids waiting for a parent that has not arrived yet
    pub fn waiting_for_parent(&self) -> usize {
        self.inner.borrow().waitlist.len()
    }

    /// Takes an object out of its parent, leaving it a root.
    /// Returns `None` if the object is not registered.
    pub fn detach(&self, identifier: &EntityId) -> Option<Detached> {
        if !self.contains(identifier) {
            return None;
        }
        if self.unlink(identifier) {
            self.mark_dirty(identifier);
        }
        self.inner.borrow_mut().waitlist.remove_child(identifier);
        Some(Detached {
            identifier: identifier.clone(),
        })
    }

    /// Places a detached object under `parent` at `position` (appended when
    /// `None` or past the end). On error the object stays a root.
    pub fn attach(
        &self,
        parent: &EntityId,
        detached: Detached,
        position: Option<usize>,
    ) -> Result<(), RegistryError> {
        let child = detached.identifier;
        for identifier in [parent, &child] {
            if !self.contains(identifier) {
                return Err(RegistryError::ObjectNotFound {
                    identifier: identifier.to_string(),
                });
            }
        }
        if self.is_ancestor(&child, parent) {
            return Err(RegistryError::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        self.unlink(&child);
        self.link(parent, &child, position);
        self.mark_dirty(&child);
        Ok(())
    }

    /// Moves `child` to the end of `parent`'s children
    pub fn append_child(&self, parent: &EntityId, child: &EntityId) -> Result<(), RegistryError> {
        if self.contains(parent) && self.is_ancestor(child, parent) {
            return Err(RegistryError::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        let detached = self
            .detach(child)
            .ok_or_else(|| RegistryError::ObjectNotFound {
                identifier: child.to_string(),
            })?;
        self.attach(parent, detached, None)
    }

    // Removal

    /// Removes an object and its whole subtree from the registry. Each
    /// removed object gets `on_removed` and a `DELETE_GAME_OBJECT`, parent
    /// before children. Nothing is sent to other peers.
    ///
    /// Returns the removed identifiers, empty if `identifier` was unknown.
    pub fn remove(&self, identifier: &EntityId) -> Vec<EntityId> {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            if !inner.objects.contains_key(identifier) {
                return Vec::new();
            }
            if let Some(parent) = inner.parents.remove(identifier) {
                if let Some(siblings) = inner.children.get_mut(&parent) {
                    siblings.retain(|sibling| sibling != identifier);
                }
            }

            let mut subtree = Vec::new();
            let mut stack = vec![identifier.clone()];
            while let Some(next) = stack.pop() {
                if let Some(children) = inner.children.remove(&next) {
                    for child in children.into_iter().rev() {
                        inner.parents.remove(&child);
                        stack.push(child);
                    }
                }
                inner.waitlist.remove_child(&next);
                if let Some(entity) = inner.objects.remove(&next) {
                    if let Some(identifiers) = inner.by_alias.get_mut(entity.alias_name()) {
                        identifiers.retain(|other| other != &next);
                    }
                    subtree.push(entity);
                }
            }
            subtree
        };

        for entity in removed.iter() {
            self.mutations.forget(entity.identifier());
        }
        for entity in removed.iter() {
            match entity.try_borrow_mut() {
                Ok(mut object) => object.on_removed(),
                Err(error) => warn!("Skipping removal hook: {}", error),
            }
            self.bus.trigger(
                DELETE_GAME_OBJECT,
                &ObjectEventPayload {
                    identifier: entity.identifier().clone(),
                    alias_name: entity.alias_name().to_string(),
                },
            );
        }
        debug!("Removed {} object(s) rooted at {}", removed.len(), identifier);
        removed
            .into_iter()
            .map(|entity| entity.identifier().clone())
            .collect()
    }

    /// Removes an object and its subtree for every peer: the identifiers
    /// can never be registered again here and are queued for broadcast.
    pub fn destroy(&self, identifier: &EntityId) -> Vec<EntityId> {
        let removed = self.remove(identifier);
        if !removed.is_empty() {
            let mut inner = self.inner.borrow_mut();
            for identifier in removed.iter() {
                inner.tombstone(identifier);
            }
            inner.removals.extend(removed.iter().cloned());
        }
        removed
    }

    /// Applies another peer's destroy notice. Unknown identifiers are still
    /// tombstoned so a late context cannot bring them back.
    pub fn receive_destroy(&self, identifiers: &[EntityId]) -> Vec<EntityId> {
        let mut removed = Vec::new();
        for identifier in identifiers {
            self.inner.borrow_mut().tombstone(identifier);
            removed.extend(self.remove(identifier));
        }
        if !removed.is_empty() {
            let mut inner = self.inner.borrow_mut();
            for identifier in removed.iter() {
                inner.tombstone(identifier);
            }
        }
        removed
    }

    // Replication

    /// Merges a context received from another peer, creating the object
    /// through its registered factory if the identifier is new. Nothing is
    /// queued for rebroadcast.
    pub fn receive_context(&self, context: &SyncContext) -> Result<EntityRef, RegistryError> {
        let identifier = &context.identifier;
        if self.is_destroyed(identifier) {
            warn!("Dropping context for destroyed object {}", identifier);
            return Err(RegistryError::Destroyed {
                identifier: identifier.to_string(),
            });
        }

        let (entity, is_new) = match self.get(identifier) {
            Some(existing) => {
                if existing.alias_name() != context.alias_name {
                    let error = RegistryError::AliasMismatch {
                        identifier: identifier.to_string(),
                        expected: existing.alias_name(),
                        actual: context.alias_name.clone(),
                    };
                    warn!("{}", error);
                    return Err(error);
                }
                (existing, false)
            }
            None => {
                let factory = self.inner.borrow().kinds.factory(&context.alias_name);
                let built = factory.and_then(|factory| {
                    build_checked(&factory, &context.alias_name, identifier.clone())
                });
                let object = match built {
                    Ok(object) => object,
                    Err(KindError::KindNotRegistered { alias_name }) => {
                        let error = RegistryError::UnknownAlias {
                            identifier: identifier.to_string(),
                            alias_name,
                        };
                        warn!("{}", error);
                        return Err(error);
                    }
                    Err(error) => {
                        warn!("{}", error);
                        return Err(error.into());
                    }
                };
                (self.insert(object), true)
            }
        };

        entity.try_borrow_mut()?.apply(context);
        self.reparent_from_context(&entity, context);
        if is_new {
            self.announce_added(&entity);
        }
        Ok(entity)
    }

    /// Full snapshot of one object, tree position included
    pub fn context(&self, identifier: &EntityId) -> Option<SyncContext> {
        match self.try_context(identifier) {
            Ok(context) => context,
            Err(error) => {
                warn!("{}", error);
                None
            }
        }
    }

    /// Snapshot of every live object, parents before their children
    pub fn contexts(&self) -> Vec<SyncContext> {
        let mut roots: Vec<EntityId> = {
            let inner = self.inner.borrow();
            inner
                .objects
                .keys()
                .filter(|identifier| !inner.parents.contains_key(*identifier))
                .cloned()
                .collect()
        };
        roots.sort();

        let mut output = Vec::new();
        let mut stack: Vec<EntityId> = roots.into_iter().rev().collect();
        while let Some(identifier) = stack.pop() {
            if let Some(context) = self.context(&identifier) {
                output.push(context);
            }
            let children = self.children_of(&identifier);
            stack.extend(children.into_iter().rev());
        }
        output
    }

    /// Forces a full resend of one object on the next flush
    pub fn mark_dirty(&self, identifier: &EntityId) {
        if let Some(entity) = self.get(identifier) {
            self.mutations
                .send_all(identifier, entity.property_count());
        }
    }

    pub fn has_outgoing(&self) -> bool {
        !self.mutations.is_clear() || !self.inner.borrow().removals.is_empty()
    }

    /// Takes a context for every object changed locally since the last
    /// call. An object changed many times yields one context.
    pub fn take_outgoing(&self) -> Vec<SyncContext> {
        let mut output = Vec::new();
        let mut deferred = Vec::new();
        for (identifier, _) in self.mutations.drain() {
            match self.try_context(&identifier) {
                Ok(Some(context)) => output.push(context),
                Ok(None) => {}
                Err(error) => {
                    warn!("{}, deferring to next flush", error);
                    deferred.push(identifier);
                }
            }
        }
        for identifier in deferred.iter() {
            self.mark_dirty(identifier);
        }
        output
    }

    /// Takes the identifiers destroyed locally since the last call
    pub fn take_removals(&self) -> Vec<EntityId> {
        std::mem::take(&mut self.inner.borrow_mut().removals)
    }

    // Internal

    fn try_add_entity(
        &self,
        object: Box<dyn Replicate>,
        parent: Option<&EntityId>,
    ) -> Result<EntityRef, RegistryError> {
        let identifier = object.identifier().clone();

        if let Some(existing) = self.get(&identifier) {
            if existing.alias_name() != object.alias_name() {
                return Err(RegistryError::AliasMismatch {
                    identifier: identifier.to_string(),
                    expected: existing.alias_name(),
                    actual: object.alias_name().to_string(),
                });
            }
            let context = object.to_context();
            existing.try_borrow_mut()?.apply(&context);
            self.mutations
                .send_all(&identifier, existing.property_count());
            debug!("Object {} already registered, applied as update", identifier);
            if let Some(parent) = parent {
                self.append_child(parent, &identifier)?;
            }
            return Ok(existing);
        }

        if self.is_destroyed(&identifier) {
            return Err(RegistryError::Destroyed {
                identifier: identifier.to_string(),
            });
        }

        let entity = self.insert(object);
        if let Some(parent) = parent {
            self.link(parent, &identifier, None);
        }
        self.mutations
            .send_all(&identifier, entity.property_count());
        self.announce_added(&entity);
        Ok(entity)
    }

    fn insert(&self, object: Box<dyn Replicate>) -> EntityRef {
        let entity = EntityRef::new(object);
        let sender = self
            .mutations
            .new_sender(entity.identifier().clone(), entity.property_count());
        entity
            .borrow_mut()
            .base_mut()
            .set_mutator(&PropertyMutator::new(sender));

        let mut inner = self.inner.borrow_mut();
        inner
            .by_alias
            .entry(entity.alias_name())
            .or_default()
            .push(entity.identifier().clone());
        inner
            .objects
            .insert(entity.identifier().clone(), entity.clone());
        entity
    }

    fn announce_added(&self, entity: &EntityRef) {
        let identifier = entity.identifier();
        let waiting = self.inner.borrow_mut().waitlist.take_children(identifier);
        for (child, order) in waiting {
            if !self.contains(&child) || self.parent_of(&child).is_some() {
                continue;
            }
            if self.is_ancestor(&child, identifier) {
                warn!(
                    "Waiting object {} is an ancestor of {}, leaving it a root",
                    child, identifier
                );
                continue;
            }
            debug!("Attaching waiting object {} to {}", child, identifier);
            self.link(identifier, &child, order.map(|order| order as usize));
        }

        match entity.try_borrow_mut() {
            Ok(mut object) => object.on_added(),
            Err(error) => warn!("Skipping added hook: {}", error),
        }
        self.bus.trigger(
            ADD_GAME_OBJECT,
            &ObjectEventPayload {
                identifier: identifier.clone(),
                alias_name: entity.alias_name().to_string(),
            },
        );
    }

    fn try_context(&self, identifier: &EntityId) -> Result<Option<SyncContext>, RegistryError> {
        let Some(entity) = self.get(identifier) else {
            return Ok(None);
        };
        let mut context = entity.try_borrow()?.to_context();
        let inner = self.inner.borrow();
        if let Some(parent) = inner.parents.get(identifier) {
            let order = inner
                .children
                .get(parent)
                .and_then(|siblings| siblings.iter().position(|sibling| sibling == identifier))
                .map(|position| position as u32);
            context.parent_identifier = Some(parent.clone());
            context.order = order;
        }
        Ok(Some(context))
    }

    fn reparent_from_context(&self, entity: &EntityRef, context: &SyncContext) {
        let identifier = entity.identifier();
        let current_parent = self.parent_of(identifier);

        let Some(parent) = context.parent_identifier.as_ref() else {
            self.unlink(identifier);
            self.inner.borrow_mut().waitlist.remove_child(identifier);
            return;
        };

        if parent == identifier {
            warn!("Object {} names itself as parent, ignoring", identifier);
            return;
        }

        if self.is_destroyed(parent) {
            debug!("Parent {} of {} was destroyed, keeping it a root", parent, identifier);
            self.unlink(identifier);
            self.inner.borrow_mut().waitlist.remove_child(identifier);
            return;
        }

        if !self.contains(parent) {
            self.unlink(identifier);
            self.inner
                .borrow_mut()
                .waitlist
                .queue(identifier, parent, context.order);
            return;
        }
        self.inner.borrow_mut().waitlist.remove_child(identifier);

        let position = context.order.map(|order| order as usize);
        if current_parent.as_ref() == Some(parent) {
            let current_position = self
                .children_of(parent)
                .iter()
                .position(|sibling| sibling == identifier);
            if position.is_some() && position != current_position {
                self.unlink(identifier);
                self.link(parent, identifier, position);
            }
            return;
        }

        if self.is_ancestor(identifier, parent) {
            warn!(
                "Moving {} under {} would create a cycle, keeping current parent",
                identifier, parent
            );
            return;
        }
        self.unlink(identifier);
        self.link(parent, identifier, position);
    }

    /// True if `ancestor` is `node` or one of its ancestors. A looping
    /// parent chain counts as a match.
    fn is_ancestor(&self, ancestor: &EntityId, node: &EntityId) -> bool {
        let inner = self.inner.borrow();
        let mut visited = HashSet::new();
        let mut current = Some(node);
        while let Some(next) = current {
            if next == ancestor || !visited.insert(next) {
                return true;
            }
            current = inner.parents.get(next);
        }
        false
    }

    fn link(&self, parent: &EntityId, child: &EntityId, position: Option<usize>) {
        let mut inner = self.inner.borrow_mut();
        inner.parents.insert(child.clone(), parent.clone());
        let siblings = inner.children.entry(parent.clone()).or_default();
        match position {
            Some(position) if position < siblings.len() => siblings.insert(position, child.clone()),
            _ => siblings.push(child.clone()),
        }
    }

    fn unlink(&self, child: &EntityId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(parent) = inner.parents.remove(child) else {
            return false;
        };
        let mut now_empty = false;
        if let Some(siblings) = inner.children.get_mut(&parent) {
            siblings.retain(|sibling| sibling != child);
            now_empty = siblings.is_empty();
        }
        if now_empty {
            inner.children.remove(&parent);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{ObjectBase, ObjectSchema, PeerId, PropertyDecl, PropertyValue};

    static CARD_SCHEMA: ObjectSchema = ObjectSchema {
        alias_name: "card",
        properties: &[
            PropertyDecl::text("name", ""),
            PropertyDecl::number("posX", 0.0),
        ],
    };

    static DECK_SCHEMA: ObjectSchema = ObjectSchema {
        alias_name: "deck",
        properties: &[PropertyDecl::text("title", "")],
    };

    struct Card {
        base: ObjectBase,
        removed: bool,
    }

    impl Replicate for Card {
        fn base(&self) -> &ObjectBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ObjectBase {
            &mut self.base
        }

        fn on_removed(&mut self) {
            self.removed = true;
        }
    }

    impl ReplicateBuilder for Card {
        const SCHEMA: &'static ObjectSchema = &CARD_SCHEMA;

        fn build(identifier: EntityId) -> Self {
            Self {
                base: ObjectBase::new(identifier, Self::SCHEMA),
                removed: false,
            }
        }
    }

    struct Deck {
        base: ObjectBase,
    }

    impl Replicate for Deck {
        fn base(&self) -> &ObjectBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ObjectBase {
            &mut self.base
        }
    }

    impl ReplicateBuilder for Deck {
        const SCHEMA: &'static ObjectSchema = &DECK_SCHEMA;

        fn build(identifier: EntityId) -> Self {
            Self {
                base: ObjectBase::new(identifier, Self::SCHEMA),
            }
        }
    }

    fn registry() -> ObjectRegistry {
        let registry = ObjectRegistry::new(&EventBus::new(PeerId::from("local")));
        registry.register_kind::<Card>();
        registry.register_kind::<Deck>();
        registry
    }

    fn record(registry: &ObjectRegistry, topic: &'static str) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let key = registry.bus().subscriber();
        registry.bus().register(&key).on(topic, move |event| {
            if let Some(payload) = event.data_as::<ObjectEventPayload>() {
                sink.borrow_mut().push(payload.identifier.to_string());
            }
        });
        seen
    }

    #[test]
    fn add_then_lookup_by_id_and_alias() {
        let registry = registry();
        let added = record(&registry, ADD_GAME_OBJECT);

        registry.add(Card::build(EntityId::from("c1")));
        registry.add(Card::build(EntityId::from("c2")));
        registry.add(Deck::build(EntityId::from("d1")));

        assert!(registry.contains(&EntityId::from("c1")));
        let cards: Vec<String> = registry
            .get_objects("card")
            .iter()
            .map(|card| card.identifier().to_string())
            .collect();
        assert_eq!(cards, vec!["c1", "c2"]);
        assert_eq!(registry.get_objects_of::<Deck>().len(), 1);
        assert!(registry.get_objects("nothing").is_empty());
        assert_eq!(*added.borrow(), vec!["c1", "c2", "d1"]);
    }

    #[test]
    fn add_existing_identifier_applies_as_update() {
        let registry = registry();
        let first = registry.add(Card::build(EntityId::from("c1")));

        let mut second = Card::build(EntityId::from("c1"));
        second.base_mut().set("name", "Queen");
        let again = registry.add(second);

        assert_eq!(registry.len(), 1);
        assert!(again.entity().ptr_eq(first.entity()));
        assert_eq!(first.borrow().base().text("name"), "Queen");
    }

    #[test]
    fn add_existing_identifier_of_other_kind_fails() {
        let registry = registry();
        registry.add(Card::build(EntityId::from("x")));

        let result = registry.try_add(Deck::build(EntityId::from("x")));

        assert!(matches!(result, Err(RegistryError::AliasMismatch { .. })));
    }

    #[test]
    fn local_writes_coalesce_into_one_context() {
        let registry = registry();
        let card = registry.add(Card::build(EntityId::from("c1")));
        registry.take_outgoing();

        card.borrow_mut().base_mut().set("posX", 1.0);
        card.borrow_mut().base_mut().set("posX", 2.0);
        card.borrow_mut().base_mut().set("name", "Ace");

        let outgoing = registry.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].get("posX"), Some(&PropertyValue::Number(2.0)));
        assert!(registry.take_outgoing().is_empty());
    }

    #[test]
    fn remove_takes_subtree_parent_first() {
        let registry = registry();
        let deleted = record(&registry, DELETE_GAME_OBJECT);
        let deck = EntityId::from("d1");
        registry.add(Deck::build(deck.clone()));
        let card = registry.add_child(&deck, Card::build(EntityId::from("c1")));
        registry.add_child(&deck, Card::build(EntityId::from("c2")));

        let removed = registry.remove(&deck);

        assert_eq!(removed, vec![deck.clone(), EntityId::from("c1"), EntityId::from("c2")]);
        assert_eq!(*deleted.borrow(), vec!["d1", "c1", "c2"]);
        assert!(registry.is_empty());
        assert!(registry.get_objects("card").is_empty());
        assert!(card.borrow().removed);
        assert!(registry.remove(&deck).is_empty());
        assert!(!registry.is_destroyed(&deck));
    }

    #[test]
    fn add_child_is_linked_before_announcement() {
        let registry = registry();
        let deck = EntityId::from("d1");
        registry.add(Deck::build(deck.clone()));
        let parents = Rc::new(RefCell::new(Vec::new()));
        let sink = parents.clone();
        let observer = registry.clone();
        let key = registry.bus().subscriber();
        registry.bus().register(&key).on(ADD_GAME_OBJECT, move |event| {
            if let Some(payload) = event.data_as::<ObjectEventPayload>() {
                sink.borrow_mut().push(observer.parent_of(&payload.identifier));
            }
        });

        registry.add_child(&deck, Card::build(EntityId::from("c1")));

        assert_eq!(*parents.borrow(), vec![Some(deck)]);
    }

    #[test]
    fn receive_context_creates_without_marking_dirty() {
        let registry = registry();
        let added = record(&registry, ADD_GAME_OBJECT);
        let context = SyncContext::new("c9", "card").with("name", "Knight");

        let entity = registry.receive_context(&context).unwrap();

        assert_eq!(entity.borrow().get("name"), Some(&PropertyValue::from("Knight")));
        assert_eq!(*added.borrow(), vec!["c9"]);
        assert!(registry.take_outgoing().is_empty());
    }

    #[test]
    fn receive_context_is_idempotent() {
        let registry = registry();
        let context = SyncContext::new("c9", "card").with("posX", 4.0);

        registry.receive_context(&context).unwrap();
        let once = registry.context(&EntityId::from("c9"));
        registry.receive_context(&context).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.context(&EntityId::from("c9")), once);
    }

    #[test]
    fn receive_context_rejects_unknown_alias() {
        let registry = registry();
        let result = registry.receive_context(&SyncContext::new("z", "dragon"));
        assert!(matches!(result, Err(RegistryError::UnknownAlias { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn receive_context_rejects_alias_change() {
        let registry = registry();
        registry.add(Card::build(EntityId::from("x")));

        let result = registry.receive_context(&SyncContext::new("x", "deck"));

        assert!(matches!(result, Err(RegistryError::AliasMismatch { .. })));
        assert!(registry.get(&EntityId::from("x")).unwrap().is::<Card>());
    }

    #[test]
    fn destroyed_identifiers_stay_dead() {
        let registry = registry();
        let id = EntityId::from("c1");
        registry.add(Card::build(id.clone()));

        assert_eq!(registry.destroy(&id), vec![id.clone()]);
        assert_eq!(registry.take_removals(), vec![id.clone()]);
        assert!(matches!(
            registry.receive_context(&SyncContext::new("c1", "card")),
            Err(RegistryError::Destroyed { .. })
        ));
        assert!(matches!(
            registry.try_add(Card::build(id.clone())),
            Err(RegistryError::Destroyed { .. })
        ));
    }

    #[test]
    fn receive_destroy_tombstones_unknown_ids() {
        let registry = registry();
        registry.receive_destroy(&[EntityId::from("late")]);
        assert!(registry
            .receive_context(&SyncContext::new("late", "card"))
            .is_err());
        assert!(registry.take_removals().is_empty());
    }

    #[test]
    fn child_before_parent_waits_then_attaches() {
        let registry = registry();
        let child = SyncContext::new("c1", "card").with_parent("d1", Some(0));

        registry.receive_context(&child).unwrap();
        assert_eq!(registry.parent_of(&EntityId::from("c1")), None);
        assert_eq!(registry.waiting_for_parent(), 1);

        registry
            .receive_context(&SyncContext::new("d1", "deck"))
            .unwrap();
        assert_eq!(registry.parent_of(&EntityId::from("c1")), Some(EntityId::from("d1")));
        assert_eq!(registry.waiting_for_parent(), 0);
    }

    #[test]
    fn mutually_waiting_contexts_do_not_form_a_cycle() {
        let registry = registry();
        let a = EntityId::from("a");
        let b = EntityId::from("b");
        let c = EntityId::from("c");

        registry
            .receive_context(&SyncContext::new("a", "deck").with_parent("b", None))
            .unwrap();
        registry
            .receive_context(&SyncContext::new("b", "deck").with_parent("a", None))
            .unwrap();
        registry
            .receive_context(&SyncContext::new("c", "card").with_parent("a", None))
            .unwrap();
        // repeating the contradiction changes nothing
        registry
            .receive_context(&SyncContext::new("a", "deck").with_parent("b", None))
            .unwrap();

        assert_eq!(registry.parent_of(&a), None);
        assert_eq!(registry.parent_of(&b), Some(a.clone()));
        assert_eq!(registry.parent_of(&c), Some(a.clone()));
        assert_eq!(registry.waiting_for_parent(), 0);
        let identifiers: Vec<EntityId> = registry
            .contexts()
            .into_iter()
            .map(|context| context.identifier)
            .collect();
        assert_eq!(identifiers, vec![a.clone(), b.clone(), c]);
        assert!(matches!(
            registry.append_child(&b, &a),
            Err(RegistryError::CycleDetected { .. })
        ));
    }

    #[test]
    fn destroyed_parent_releases_waiting_children() {
        let registry = registry();
        registry
            .receive_context(&SyncContext::new("c1", "card").with_parent("d1", None))
            .unwrap();
        assert_eq!(registry.waiting_for_parent(), 1);

        registry.receive_destroy(&[EntityId::from("d1")]);
        assert_eq!(registry.waiting_for_parent(), 0);

        registry
            .receive_context(&SyncContext::new("c2", "card").with_parent("d1", None))
            .unwrap();
        assert_eq!(registry.waiting_for_parent(), 0);
        assert_eq!(registry.parent_of(&EntityId::from("c2")), None);
    }

    #[test]
    fn oldest_tombstones_are_forgotten_past_capacity() {
        let registry = registry();
        registry.set_tombstone_capacity(2);

        registry.receive_destroy(&[
            EntityId::from("t1"),
            EntityId::from("t2"),
            EntityId::from("t3"),
        ]);
        registry.receive_destroy(&[EntityId::from("t3")]);

        assert_eq!(registry.tombstone_count(), 2);
        assert!(!registry.is_destroyed(&EntityId::from("t1")));
        assert!(registry.is_destroyed(&EntityId::from("t2")));
        assert!(registry.is_destroyed(&EntityId::from("t3")));

        registry.set_tombstone_capacity(1);
        assert!(!registry.is_destroyed(&EntityId::from("t2")));
        assert!(registry.is_destroyed(&EntityId::from("t3")));
    }

    #[test]
    fn attach_refuses_cycles() {
        let registry = registry();
        let a = EntityId::from("a");
        let b = EntityId::from("b");
        registry.add(Deck::build(a.clone()));
        registry.add_child(&a, Deck::build(b.clone()));

        let result = registry.append_child(&b, &a);

        assert!(matches!(result, Err(RegistryError::CycleDetected { .. })));
        assert_eq!(registry.parent_of(&b), Some(a.clone()));
        assert_eq!(registry.parent_of(&a), None);
    }

    #[test]
    fn detach_and_attach_moves_and_marks_dirty() {
        let registry = registry();
        let a = EntityId::from("a");
        let b = EntityId::from("b");
        let c = EntityId::from("c");
        registry.add(Deck::build(a.clone()));
        registry.add(Deck::build(b.clone()));
        registry.add_child(&a, Card::build(c.clone()));
        registry.take_outgoing();

        let detached = registry.detach(&c).unwrap();
        registry.attach(&b, detached, Some(0)).unwrap();

        assert!(registry.children_of(&a).is_empty());
        assert_eq!(registry.children_of(&b), vec![c.clone()]);
        let outgoing = registry.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].parent_identifier, Some(b));
        assert_eq!(outgoing[0].order, Some(0));
    }

    #[test]
    fn contexts_list_parents_first() {
        let registry = registry();
        let deck = EntityId::from("z-deck");
        registry.add(Deck::build(deck.clone()));
        registry.add_child(&deck, Card::build(EntityId::from("a-card")));

        let contexts = registry.contexts();

        assert_eq!(contexts[0].identifier, deck);
        assert_eq!(contexts[1].parent_identifier, Some(deck));
    }

    #[test]
    fn receive_context_keeps_absent_keys() {
        let registry = registry();
        registry
            .receive_context(&SyncContext::new("c1", "card").with("name", "Ace").with("posX", 3.0))
            .unwrap();

        registry
            .receive_context(&SyncContext::new("c1", "card").with("posX", 5.0))
            .unwrap();

        let context = registry.context(&EntityId::from("c1")).unwrap();
        assert_eq!(context.get("name"), Some(&PropertyValue::from("Ace")));
        assert_eq!(context.get("posX"), Some(&PropertyValue::Number(5.0)));
    }
}
