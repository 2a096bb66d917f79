//! Inference - the unified bundle and the raw record schema it accepts

pub mod bundle;
pub mod record;

pub use bundle::{input_signature, HousingPipeline, InputExample, SignatureField, BUNDLE_FORMAT_VERSION};
pub use record::{frame_to_records, records_to_frame, HousingFeatures};
