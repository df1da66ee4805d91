use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageVersion, Registry, Repository, Tag},
};
use regex::Regex;

/// Parsed Docker-style image reference
///
/// A complete image name contains a [Registry], [Repository], [Tag], and
/// [ContentDigest] in that order. Only the [Repository] component is mandatory.
///
/// The [Tag] always begins with a `:` and the [ContentDigest] with an `@`, but
/// telling the optional [Registry] apart from the first segment of the
/// [Repository] takes the same heuristic Docker uses: if the first segment
/// contains a dot or a colon, or is exactly `localhost`, it names a registry.
///
/// A name with a digest is *canonical*: it pins the exact manifest bytes. A
/// name with only a tag is as trustworthy as the registry that resolves it.
#[derive(Clone)]
pub struct ImageName {
    serialized: String,
    registry: Option<Registry>,
    repository: Repository,
    tag: Option<Tag>,
    digest: Option<ContentDigest>,
}

serialized_identity!(ImageName);

impl ImageName {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Build an [ImageName] from its component pieces
    ///
    /// This fails if any component is invalid, or if the assembled string
    /// would parse differently than intended. For example, a repository whose
    /// first segment looks like a registry can't be used without a registry.
    pub fn from_parts(
        registry: Option<&str>,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Self, ImageError> {
        let mut combined = String::new();
        if let Some(registry) = registry {
            combined.push_str(registry);
            combined.push('/');
        }
        combined.push_str(repository);
        if let Some(tag) = tag {
            combined.push(':');
            combined.push_str(tag);
        }
        if let Some(digest) = digest {
            combined.push('@');
            combined.push_str(digest);
        }
        let parsed = ImageName::parse(&combined)?;
        if parsed.as_parts() == (registry, repository, tag, digest) {
            Ok(parsed)
        } else {
            Err(ImageError::InvalidReferenceFormat(combined))
        }
    }

    /// References to the registry, repository, tag and digest strings
    pub fn as_parts(&self) -> (Option<&str>, &str, Option<&str>, Option<&str>) {
        (
            self.registry.as_ref().map(Registry::as_str),
            self.repository.as_str(),
            self.tag.as_ref().map(Tag::as_str),
            self.digest.as_ref().map(ContentDigest::as_str),
        )
    }

    /// Parse a [prim@str] as an [ImageName]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref HAS_REGISTRY: Regex = Regex::new(concat!(
                "^(?:",
                /* */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])", // dotted domain
                /* */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))+",
                /* */ "(?::[0-9]+)?",
                "|",
                /* */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])", // host with a port
                /* */ ":[0-9]+",
                "|",
                /* */ "localhost(?::[0-9]+)?",
                ")/",
            ))
            .unwrap();
            static ref WITH_REGISTRY: Regex = Regex::new(&format!(
                "^{}/{}(?::{})?(?:@{})?$",
                Registry::regex_str(),
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
            static ref NO_REGISTRY: Regex = Regex::new(&format!(
                "^{}(?::{})?(?:@{})?$",
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
        }
        let invalid = || ImageError::InvalidReferenceFormat(s.to_owned());
        let pattern: &Regex = if HAS_REGISTRY.is_match(s) {
            &*WITH_REGISTRY
        } else {
            &*NO_REGISTRY
        };
        let captures = pattern.captures(s).ok_or_else(invalid)?;
        Ok(ImageName {
            serialized: s.to_owned(),
            registry: captures
                .name("reg")
                .map(|m| Registry::parse(m.as_str()))
                .transpose()?,
            repository: Repository::parse(captures.name("repo").ok_or_else(invalid)?.as_str())?,
            tag: captures
                .name("tag")
                .map(|m| Tag::parse(m.as_str()))
                .transpose()?,
            digest: captures
                .name("dig")
                .map(|m| ContentDigest::parse(m.as_str()))
                .transpose()?,
        })
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    pub fn content_digest(&self) -> Option<&ContentDigest> {
        self.digest.as_ref()
    }

    /// Is this name pinned to a specific content digest?
    pub fn is_canonical(&self) -> bool {
        self.digest.is_some()
    }

    /// Returns the most specific available version
    ///
    /// If the image name includes a digest, this returns the digest. Otherwise,
    /// it returns the tag, defaulting to `latest` if no tag is set.
    pub fn version(&self) -> ImageVersion {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => ImageVersion::ContentDigest(digest.clone()),
            (None, Some(tag)) => ImageVersion::Tag(tag.clone()),
            (None, None) => ImageVersion::Tag(Tag::latest()),
        }
    }

    /// Create a new [ImageName] which includes the content digest we found
    ///
    /// If the name already includes a digest, it is validated. On mismatch, an
    /// error is returned. Otherwise the digest is appended, keeping any tag.
    pub fn with_found_digest(&self, found_digest: &ContentDigest) -> Result<ImageName, ImageError> {
        match &self.digest {
            None => ImageName::from_parts(
                self.registry.as_ref().map(Registry::as_str),
                self.repository.as_str(),
                self.tag.as_ref().map(Tag::as_str),
                Some(found_digest.as_str()),
            ),
            Some(image_digest) if image_digest == found_digest => Ok(self.clone()),
            Some(image_digest) => Err(ImageError::ContentDigestMismatch {
                expected: image_digest.clone(),
                found: found_digest.clone(),
            }),
        }
    }

    /// The canonical `[registry/]repository@digest` form for some content
    ///
    /// Unlike [ImageName::with_found_digest] this drops the tag, since a tag
    /// says nothing about content once the digest is known.
    pub fn canonical(&self, digest: &ContentDigest) -> Result<ImageName, ImageError> {
        ImageName::from_parts(
            self.registry.as_ref().map(Registry::as_str),
            self.repository.as_str(),
            None,
            Some(digest.as_str()),
        )
    }
}
