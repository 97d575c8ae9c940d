// BIDS dataset module
// Entity enumeration and path construction for the BIDS layout

pub mod channels;
pub mod entities;
pub mod path;

pub use channels::{annotate_channels, ChannelsError};
pub use entities::{enumerate_entities, scan_dataset, EntityError, EntityLabels};
pub use path::EntitySelector;
