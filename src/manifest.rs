//! Manifest media types
//!
//! Manifests are carried as opaque bytes. The only thing we ever look at is
//! the optional top-level `mediaType` field, and only to label an upload.

pub mod media_types {
    pub const DOCKER_V2_SCHEMA2: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_V2_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const DOCKER_V2_SCHEMA1: &str = "application/vnd.docker.distribution.manifest.v1+json";
    pub const DOCKER_V2_SCHEMA1_SIGNED: &str =
        "application/vnd.docker.distribution.manifest.v1+prettyjws";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

    /// Every manifest type we are willing to receive, most preferred first
    pub const ACCEPTED: &[&str] = &[
        DOCKER_V2_SCHEMA2,
        DOCKER_V2_LIST,
        OCI_MANIFEST,
        OCI_INDEX,
        DOCKER_V2_SCHEMA1_SIGNED,
        DOCKER_V2_SCHEMA1,
    ];
}

#[derive(Deserialize)]
struct MediaTypeProbe {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
    #[serde(rename = "schemaVersion")]
    schema_version: Option<u32>,
    signatures: Option<serde_json::Value>,
}

/// Pick a `Content-Type` for uploading a manifest
///
/// Uses the manifest's own `mediaType` when it declares one, recognizes
/// schema 1 manifests by their version field, and otherwise falls back to
/// the Docker v2 schema 2 type. Bytes that aren't JSON get the fallback too.
pub fn guess_media_type(manifest: &[u8]) -> String {
    match serde_json::from_slice::<MediaTypeProbe>(manifest) {
        Ok(MediaTypeProbe {
            media_type: Some(media_type),
            ..
        }) if !media_type.is_empty() => media_type,
        Ok(MediaTypeProbe {
            schema_version: Some(1),
            signatures,
            ..
        }) => match signatures {
            Some(_) => media_types::DOCKER_V2_SCHEMA1_SIGNED.to_owned(),
            None => media_types::DOCKER_V2_SCHEMA1.to_owned(),
        },
        _ => media_types::DOCKER_V2_SCHEMA2.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn guesses() {
        assert_eq!(
            guess_media_type(br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json"}"#),
            media_types::OCI_INDEX
        );
        assert_eq!(
            guess_media_type(br#"{"schemaVersion":1,"name":"x"}"#),
            media_types::DOCKER_V2_SCHEMA1
        );
        assert_eq!(
            guess_media_type(br#"{"schemaVersion":1,"signatures":[]}"#),
            media_types::DOCKER_V2_SCHEMA1_SIGNED
        );
        assert_eq!(
            guess_media_type(br#"{"schemaVersion":2,"config":{}}"#),
            media_types::DOCKER_V2_SCHEMA2
        );
        assert_eq!(guess_media_type(b"test-manifest"), media_types::DOCKER_V2_SCHEMA2);
    }
}
