pub mod bar;
pub mod features;
pub mod instrument;
pub mod ranked;

pub use bar::PriceBar;
pub use features::{CatalystFlags, FeatureVector};
pub use instrument::InstrumentMeta;
pub use ranked::RankedRow;
