use crate::{
    errors::ImageError,
    image::{ContentDigest, Tag},
};
use std::{fmt, str::FromStr};

/// Either a tag or a content digest
///
/// This is what a registry accepts in the `<reference>` position of a
/// manifest URL. Every [crate::image::ImageName] resolves to one: its digest
/// if it has one, otherwise its tag, otherwise `latest`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ImageVersion {
    Tag(Tag),
    ContentDigest(ContentDigest),
}

impl ImageVersion {
    pub fn as_str(&self) -> &str {
        match self {
            ImageVersion::Tag(tag) => tag.as_str(),
            ImageVersion::ContentDigest(content_digest) => content_digest.as_str(),
        }
    }

    /// Parse a [prim@str] as an [ImageVersion]
    ///
    /// Tags can't contain a colon, so anything with one is parsed as a digest.
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        if s.contains(':') {
            Ok(ImageVersion::ContentDigest(ContentDigest::parse(s)?))
        } else {
            Ok(ImageVersion::Tag(Tag::parse(s)?))
        }
    }

    /// The digest, for digest-pinned versions
    pub fn content_digest(&self) -> Option<&ContentDigest> {
        match self {
            ImageVersion::Tag(_) => None,
            ImageVersion::ContentDigest(digest) => Some(digest),
        }
    }

    pub fn is_content_digest(&self) -> bool {
        self.content_digest().is_some()
    }

    pub fn is_tag(&self) -> bool {
        !self.is_content_digest()
    }
}

impl From<ContentDigest> for ImageVersion {
    fn from(digest: ContentDigest) -> Self {
        ImageVersion::ContentDigest(digest)
    }
}

impl From<Tag> for ImageVersion {
    fn from(tag: Tag) -> Self {
        ImageVersion::Tag(tag)
    }
}

impl FromStr for ImageVersion {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageVersion::parse(s)
    }
}

impl fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
