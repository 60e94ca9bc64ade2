pub mod image_sequence_source;
pub mod still_image;
pub mod synthetic_frame_source;
