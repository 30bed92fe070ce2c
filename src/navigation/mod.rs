//! Outlines, destinations and page copying
//!
//! Links and outline items refer to pages by object identity. When pages
//! move to another document those references are rewritten in a second
//! pass, after every page of the copy exists in the target.

mod copier;
mod outline;
mod resolver;

pub use copier::{PageCopier, PAGE_EXCLUDED_KEYS};
pub use outline::{OutlineId, Outlines};
pub use resolver::{Destination, DestinationResolver, PendingDestination, Readdress, ResolutionReport};
