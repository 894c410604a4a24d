use crate::aspect::AspectCategory;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};

/// Random bytes behind every object name
const KEY_ENTROPY_BYTES: usize = 32;

/// Container extension of every stored object
const OBJECT_EXTENSION: &str = "mp4";

/// Generate a fresh object key: `{category}/{43 url-safe base64 chars}.mp4`
///
/// The random segment comes from the OS CSPRNG and never from request data,
/// so keys cannot be predicted or steered by uploaders.
pub fn generate_object_key(category: AspectCategory) -> String {
    let mut name = [0u8; KEY_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut name);

    format!(
        "{category}/{name}.{ext}",
        category = category.as_str(),
        name = URL_SAFE_NO_PAD.encode(name),
        ext = OBJECT_EXTENSION
    )
}
