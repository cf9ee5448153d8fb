//! Persisted boot decision record and the storage it lives on.
#![cfg_attr(not(feature = "_test"), no_std)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod record;
pub mod store;
pub mod volume;
