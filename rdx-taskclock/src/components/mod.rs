//! Contains the building blocks scheduled work is made of.
//!
//! A [`trigger::ScheduledTrigger`] says *when* to act, matched once per poll
//! against the wall-clock minute. A [`sequence::ActionSequence`] says *what*
//! to do: an ordered list of device actions the orchestrator runs step by
//! step.

pub mod sequence;
pub mod trigger;
