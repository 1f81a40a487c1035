use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::io::Write as _;
use std::path::Path;

/// Pluralize (add an 's' sufix) to `text` based on `count`.
pub fn pluralize(text: &str, count: usize) -> Cow<'_, str> {
    if count == 1 {
        text.into()
    } else {
        format!("{}s", text).into()
    }
}

/// Reads a JSON document, falling back to `T::default()` when the file is
/// absent, blank or malformed. A malformed document is logged, never fatal.
pub fn load_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!("failed to read {}, using default: {e}", path.display());
            return T::default();
        }
    };
    if contents.trim().is_empty() {
        return T::default();
    }
    match crate::deserialize_payload::<T>(&contents) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("failed to parse {}, using default: {e:?}", path.display());
            T::default()
        }
    }
}

/// Replaces `path` with the pretty-printed JSON form of `value`.
///
/// The document is written to a temporary file in the same directory and then
/// renamed over the target, so readers never observe a half-written file.
pub fn save_json_pretty<T>(path: &Path, value: &T) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_string_pretty(value)?;
    write_atomically(path, body.as_bytes())
}

pub fn write_atomically(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
