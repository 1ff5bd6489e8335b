//! Per-slot state trackers feeding the evaluators: call status, IMS
//! registration and WFC settings, filtered telephony state, and the
//! process-wide IWLAN availability tracker.

pub mod call;
pub mod cellular;
pub mod ims;
pub mod iwlan;
