use crate::image::ContentDigest;
use std::path::{Path, PathBuf};

static MANIFEST_FILE: &str = "manifest.json";
static INSTANCE_MANIFEST_EXT: &str = ".manifest.json";
static BLOB_EXT: &str = ".blob";
static TEMP_EXT: &str = ".tmp";
static SIGNATURE_PREFIX: &str = "signature-";

/// Every file an image directory can contain
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum LayoutKey {
    Temp(u32, u64),
    Manifest,
    InstanceManifest(ContentDigest),
    Blob(String),
    Signature(usize),
}

impl LayoutKey {
    pub fn temp() -> Self {
        LayoutKey::Temp(std::process::id(), rand::random::<u64>())
    }

    pub fn file_name(&self) -> String {
        match self {
            LayoutKey::Temp(pid, random) => format!("{}-{}{}", pid, random, TEMP_EXT),
            LayoutKey::Manifest => MANIFEST_FILE.to_owned(),
            LayoutKey::InstanceManifest(digest) => {
                format!("{}{}", path_encode(digest.as_str()), INSTANCE_MANIFEST_EXT)
            }
            LayoutKey::Blob(digest) => format!("{}{}", path_encode(digest), BLOB_EXT),
            LayoutKey::Signature(index) => format!("{}{}", SIGNATURE_PREFIX, index),
        }
    }

    pub fn to_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.file_name())
    }

    /// Is this a file name that only a write into an image directory makes?
    ///
    /// Temporary files don't count, they are never visible content.
    pub fn is_artifact_name(name: &str) -> bool {
        name == MANIFEST_FILE
            || name.ends_with(BLOB_EXT)
            || name.ends_with(INSTANCE_MANIFEST_EXT)
            || name
                .strip_prefix(SIGNATURE_PREFIX)
                .map_or(false, |index| index.parse::<usize>().map_or(false, |i| i > 0))
    }
}

/// Encode any input string in a way which preserves uniqueness but only uses
/// lowercase alphanumeric characters and dashes.
///
/// Characters outside that set are replaced, runs of replacements collapse to
/// a single dash, and every change (case conversion or replacement) is
/// recorded in a suffix of base-18 varints so no two inputs share an output.
pub fn path_encode(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 16);
    let mut changes = String::with_capacity(16);
    let mut in_replacement = false;
    for (idx, ch) in input.char_indices() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            in_replacement = false;
            result.push(ch)
        } else if ch.is_ascii_uppercase() {
            in_replacement = false;
            result.push(ch.to_ascii_lowercase());
            push_base18_varint(&mut changes, idx << 1);
        } else {
            if idx > 0 && !in_replacement {
                result.push('-');
            }
            in_replacement = true;
            push_base18_varint(&mut changes, (idx << 1) | 1);
            push_base18_varint(&mut changes, ch as usize);
        }
    }
    if result.is_empty() {
        // Output can't be empty; record a NUL replacement just past the end
        in_replacement = false;
        result.push('0');
        push_base18_varint(&mut changes, (input.len() << 1) | 1);
        push_base18_varint(&mut changes, 0);
    }
    if !changes.is_empty() {
        if !in_replacement {
            result.push('-');
        }
        result.push_str(&changes);
    }
    result
}

/// Variable length integer encoding using only lowercase alphanumeric chars
///
/// Digits `0-h` end a number, `i-z` carry a base-18 digit and continue.
fn push_base18_varint(buf: &mut String, mut value: usize) {
    loop {
        let digit = value % 18;
        value /= 18;
        let more = value != 0;
        if more {
            value -= 1;
        }
        let base36 = if more { 18 + digit } else { digit };
        buf.push(std::char::from_digit(base36 as u32, 36).unwrap_or('0'));
        if !more {
            break;
        }
    }
}
