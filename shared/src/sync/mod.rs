pub mod object_synchronizer;
