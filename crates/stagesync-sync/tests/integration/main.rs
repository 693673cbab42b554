//! Integration tests for stagesync-sync
//!
//! Runs full sync passes for several simulated devices against one team
//! stored by the folder provider, and checks what each device ends up with.

mod common;

mod test_failures;
mod test_methods;
mod test_propagation;
