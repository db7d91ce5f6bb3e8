//! Duplicate Call Suppression Module
//!
//! Collapses concurrent requests for the same key into a single unit of work.
//!
//! ## Core Concepts
//! - **Leader**: The first caller for a key. It runs the loader outside the group lock.
//! - **Follower**: Any caller arriving while the leader runs. It waits on the call's
//!   completion signal and receives a clone of the leader's result.
//! - **Cleanup**: The call entry is removed by the leader on every exit path. If the
//!   leader never produced a result, followers observe [`group::LeaderFailed`].

pub mod group;

#[cfg(test)]
mod tests;
