//! `Resource<T>` holds a value with exactly one owner and a deterministic lifetime.
//! `Handle<T>` is a lightweight, non-owning reference to that value that can tell, at any time,
//! whether the owning `Resource<T>` has already been dropped.
//!
//! A handle never keeps the value alive. What it shares with the resource is a small liveness block:
//! one flag for "the owner still exists" and a count of the live handles. The resource allocates the
//! block the first time a handle is requested. Whichever of the resource or the last handle goes away
//! second frees it.
//!
//! ```
//! use resource_handle::Resource;
//!
//! let resource = Resource::pin(String::from("owned"));
//! let handle = Resource::create_reference(resource.as_ref());
//! assert!(handle.exists());
//!
//! drop(resource);
//! assert!(!handle.exists());
//! assert_eq!(handle.reference_count(), 1);
//! ```
//!
//! ## Features
//! - `nostd`: build without the standard library (needs `alloc`).
//! - `no-atomic`: count handles with plain cells. Nothing becomes `Send` or `Sync`.
//!
//! The liveness block's lifecycle is logged through the [`log`] facade at `trace` level.

#![cfg_attr(all(feature = "nostd", not(test)), no_std)]

extern crate alloc;

mod liveness;
pub mod resource;
pub use crate::resource::Handle;
pub use crate::resource::Resource;
