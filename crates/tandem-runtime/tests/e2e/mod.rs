//! End-to-end tests: host types driven from script through the reference VM

mod harness;
mod fixtures;

mod environment;
mod errors;
mod events_indexers;
mod generics;
mod members;
mod overloads;
mod scenario;
mod structs_arrays;
