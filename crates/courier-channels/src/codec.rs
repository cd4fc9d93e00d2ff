use base64::Engine;

use crate::error::ChannelError;

/// Opaque encrypt/decrypt capability for the long-lived credential blob.
///
/// The core never inspects the blob format; it stores whatever `encrypt`
/// returns and hands `decrypt`'s output to the
/// [`MessengerFactory`](crate::messenger::MessengerFactory) unchanged.
pub trait CredentialCodec: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, ChannelError>;
    fn decrypt(&self, blob: &str) -> Result<String, ChannelError>;
}

/// Development codec: base64, no secrecy.
///
/// Exists so local and CI deployments run without key material. Production
/// deployments plug their real codec in through the same trait.
pub struct Base64Codec;

impl CredentialCodec for Base64Codec {
    fn encrypt(&self, plaintext: &str) -> Result<String, ChannelError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(plaintext))
    }

    fn decrypt(&self, blob: &str) -> Result<String, ChannelError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(blob)
            .map_err(|e| ChannelError::Codec(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ChannelError::Codec(e.to_string()))
    }
}
