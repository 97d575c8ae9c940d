// fNIRS signal module
// Recording model, SNIRF loading and the signal-quality computations

pub mod events;
pub mod filter;
pub mod loader;
pub mod optical_density;
pub mod quality;
pub mod recording;
pub mod snirf;
pub mod spectrum;

pub use events::{events_from_annotations, Event, EventSummary};
pub use filter::QualityBand;
pub use loader::{LoadError, RecordingLoader, SnirfLoader};
pub use optical_density::optical_density;
pub use quality::{
    channels_below, peak_power, scalp_coupling_index, scalp_coupling_index_windowed,
    WindowedScores,
};
pub use recording::{Annotation, Channel, NirsError, Recording, SignalUnit, SubjectInfo};
pub use spectrum::{welch, PowerSpectrum};
