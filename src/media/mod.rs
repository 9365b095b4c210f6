//! Image payload handling for multimodal chat messages.

pub mod image;

pub use image::{
    decode_base64_image, parse_data_uri, sniff_image_mime, to_data_uri, ImageMimePolicy,
};
