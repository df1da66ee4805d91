use crate::{
    docker::{client::RegistrySession, DockerImageSource},
    errors::ImageError,
    image::Image,
};
use regex::Regex;
use reqwest::{header::LINK, Response, StatusCode};
use std::ops::Deref;
use url::Url;

/// An image on a registry, with the extras only a registry can offer
pub struct DockerImage {
    image: Image<DockerImageSource>,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(alias = "Tags")]
    tags: Option<Vec<String>>,
}

impl DockerImage {
    pub fn new(src: DockerImageSource) -> Self {
        DockerImage {
            image: Image::new(src),
        }
    }

    fn session(&self) -> &RegistrySession {
        &self.image.source().session
    }

    /// The fully expanded `registry/repository` this image is read from
    ///
    /// Names without a registry resolve to the default one, and single
    /// segment names on it get the library prefix, so `busybox` becomes
    /// `registry-1.docker.io/library/busybox`.
    pub fn source_ref_full_name(&self) -> String {
        format!("{}/{}", self.session().registry(), self.session().repository())
    }

    /// Every tag in the image's repository, following pagination
    ///
    /// Any status other than 200, or a body that isn't a tag list, is a
    /// connection error rather than "not found".
    pub async fn repository_tags(&self) -> Result<Vec<String>, ImageError> {
        let mut tags = Vec::new();
        let mut next = Some(self.session().repository_url("tags/list")?);
        while let Some(url) = next.take() {
            log::debug!("listing tags at {}", url);
            let response = self.session().send(|req| req.get(url.clone())).await?;
            if response.status() != StatusCode::OK {
                return Err(ImageError::UnexpectedStatus {
                    url: url.to_string(),
                    status: response.status(),
                });
            }
            next = next_page(&url, &response)?;
            let page: TagList = response
                .json()
                .await
                .map_err(|err| ImageError::MalformedResponse {
                    url: url.to_string(),
                    reason: err.to_string(),
                })?;
            tags.extend(page.tags.unwrap_or_default());
        }
        Ok(tags)
    }

    pub fn into_image(self) -> Image<DockerImageSource> {
        self.image
    }
}

impl Deref for DockerImage {
    type Target = Image<DockerImageSource>;

    fn deref(&self) -> &Self::Target {
        &self.image
    }
}

/// Follow a `Link: <...>; rel="next"` header, relative to the current page
fn next_page(current: &Url, response: &Response) -> Result<Option<Url>, ImageError> {
    lazy_static! {
        static ref NEXT: Regex = Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).unwrap();
    }
    for value in response.headers().get_all(LINK) {
        let value = value.to_str().map_err(|err| ImageError::MalformedResponse {
            url: current.to_string(),
            reason: err.to_string(),
        })?;
        if let Some(captures) = NEXT.captures(value) {
            let link = &captures[1];
            return current
                .join(link)
                .map(Some)
                .map_err(|err| ImageError::MalformedResponse {
                    url: link.to_owned(),
                    reason: err.to_string(),
                });
        }
    }
    Ok(None)
}
