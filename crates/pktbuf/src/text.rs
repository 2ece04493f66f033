// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::BoxedError;

/// Converts between text and its byte representation in a packet buffer.
///
/// The character sequence accessors of [`BufferAccess`][crate::BufferAccess] delegate every
/// conversion to a codec, which keeps the buffer itself free of any text encoding logic.
pub trait TextCodec {
    /// A name identifying the encoding in error messages, such as `UTF-8`.
    fn name(&self) -> &str;

    /// Encodes `text` into bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be represented in this encoding.
    fn encode(&self, text: &str) -> Result<Vec<u8>, BoxedError>;

    /// Decodes `bytes` into text.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid in this encoding.
    fn decode(&self, bytes: &[u8]) -> Result<String, BoxedError>;
}

/// The UTF-8 codec of the standard library.
#[derive(Clone, Copy, Debug, Default)]
pub struct Utf8;

impl TextCodec for Utf8 {
    fn name(&self) -> &'static str {
        "UTF-8"
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, BoxedError> {
        Ok(text.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, BoxedError> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}
