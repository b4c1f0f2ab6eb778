//! BDD scenarios for the machine lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Create a machine without a swap file"
)]
fn scenario_create_without_swap(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Create a machine with a swap file"
)]
fn scenario_create_with_swap(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Swap failures keep the scalet"
)]
fn scenario_swap_failure(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Remove deletes the key and then the scalet"
)]
fn scenario_remove(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Remove stops when the key cannot be deleted"
)]
fn scenario_remove_key_failure(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}
