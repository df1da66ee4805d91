use crate::{config::Login, errors::ImageError, image::Registry};
use regex::Regex;
use reqwest::RequestBuilder;
use url::Url;

/// Credentials attached to every request once a challenge has been answered
#[derive(Clone)]
pub(crate) enum Credential {
    Bearer(String),
    Basic(Login),
}

impl Credential {
    pub fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Bearer(token) => req.bearer_auth(token),
            Credential::Basic(login) => req.basic_auth(&login.username, login.password.as_ref()),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Bearer(..)"),
            Credential::Basic(login) => write!(f, "Basic({})", login.username),
        }
    }
}

/// Parsed `WWW-Authenticate` header from a 401 response
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum Challenge {
    Bearer(BearerChallenge),
    Basic,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct BearerChallenge {
    pub realm: Url,
    pub service: Option<String>,
    pub scope: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

impl Challenge {
    pub fn parse(auth_header: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref BASIC: Regex = Regex::new(r"^\s*(?i:basic)(?:\s|$)").unwrap();
        }
        if BASIC.is_match(auth_header) {
            Ok(Challenge::Basic)
        } else {
            BearerChallenge::parse(auth_header).map(Challenge::Bearer)
        }
    }

    /// Answer this challenge, possibly by asking a token server
    ///
    /// Reference: <https://docs.docker.com/registry/spec/auth/token/>
    pub async fn respond(
        &self,
        registry: &Registry,
        login: Option<&Login>,
        req: &reqwest::Client,
        default_scope: &str,
    ) -> Result<Credential, ImageError> {
        match self {
            Challenge::Basic => match login {
                Some(login) => Ok(Credential::Basic(login.clone())),
                None => Err(ImageError::UnsupportedAuthentication(format!(
                    "basic authentication requested by {} but no login is configured",
                    registry
                ))),
            },
            Challenge::Bearer(challenge) => {
                if registry.is_https() && challenge.realm.scheme() != "https" {
                    return Err(ImageError::UnsupportedAuthentication(format!(
                        "token realm {} is not https",
                        challenge.realm
                    )));
                }
                let scope = challenge.scope.as_deref().unwrap_or(default_scope);
                log::debug!("login challenge for {}, {:?}", registry, challenge);
                let mut query = vec![("scope", scope)];
                if let Some(service) = &challenge.service {
                    query.push(("service", service.as_str()));
                }
                let token_req = req.get(challenge.realm.clone()).query(&query);
                let token_req = match login {
                    Some(login) => token_req.basic_auth(&login.username, login.password.as_ref()),
                    None => token_req,
                };
                let response = token_req.send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ImageError::UnexpectedStatus {
                        url: challenge.realm.to_string(),
                        status,
                    });
                }
                let body: TokenResponse =
                    response
                        .json()
                        .await
                        .map_err(|err| ImageError::MalformedResponse {
                            url: challenge.realm.to_string(),
                            reason: err.to_string(),
                        })?;
                match body.token.or(body.access_token) {
                    Some(token) => {
                        log::debug!("received token for {}", registry);
                        Ok(Credential::Bearer(token))
                    }
                    None => Err(ImageError::MalformedResponse {
                        url: challenge.realm.to_string(),
                        reason: "token response has no token".to_owned(),
                    }),
                }
            }
        }
    }
}

impl BearerChallenge {
    fn parse(auth_header: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(concat!(
                "^\\s*",
                "(?i:bearer)",   // Case-insensitive challenge type
                "(?:",           // multiple unordered parameters
                /* */ "\\s*",
                /* */ "(?:",     // alternative group for the parameters
                /* -- */ "(?:",  // parameter: service
                /* -- -- */ "service=",
                /* -- -- */ "\"(?P<service>",
                /* -- -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // allowed chars from RFC 6750
                /* -- -- */ ")\"",
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: scope
                /* -- -- */ "scope=",
                /* -- -- */ "\"(?P<scope>",
                /* -- -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // allowed chars from RFC 6750
                /* -- -- */ ")\"",
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: error, ignored
                /* -- -- */ "error=",
                /* -- -- */ r#""[\x20-\x21\x23-\x5B\x5D-\x7E]*""#,
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: realm
                /* -- -- */ "realm=",
                /* -- -- */ "\"(?P<realm>", // capture quoted string
                /* -- -- -- */ "https?://",
                /* -- -- -- */ "[-_.+a-zA-Z:0-9/]+",
                /* -- -- */ ")\"",
                /* -- */ ")",
                /* */ ")",
                /* */ ",?",      // to keep the parser regular, commas are all optional *shrug*
                ")*\\s*$",
            )).unwrap();
        }
        match RE.captures(auth_header).map(|captures| {
            (
                captures.name("service").map(|m| m.as_str().to_owned()),
                captures.name("scope").map(|m| m.as_str().to_owned()),
                captures.name("realm").map(|m| m.as_str().parse::<Url>()),
            )
        }) {
            Some((service, scope, Some(Ok(realm)))) => Ok(BearerChallenge {
                realm,
                service,
                scope,
            }),
            _ => Err(ImageError::UnsupportedAuthentication(
                auth_header.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bearer_challenges() {
        let parsed = Challenge::parse(concat!(
            "Bearer realm=\"https://auth.docker.io/token\",",
            "service=\"registry.docker.io\",",
            "scope=\"repository:library/busybox:pull\""
        ))
        .unwrap();
        assert_eq!(
            parsed,
            Challenge::Bearer(BearerChallenge {
                realm: "https://auth.docker.io/token".parse().unwrap(),
                service: Some("registry.docker.io".into()),
                scope: Some("repository:library/busybox:pull".into()),
            })
        );

        let parsed = Challenge::parse(
            "bearer scope=\"a:b:c\" realm=\"http://localhost:5001/token\" error=\"insufficient_scope\"",
        )
        .unwrap();
        match parsed {
            Challenge::Bearer(challenge) => {
                assert_eq!(challenge.realm.as_str(), "http://localhost:5001/token");
                assert_eq!(challenge.service, None);
                assert_eq!(challenge.scope.as_deref(), Some("a:b:c"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn basic_and_unsupported() {
        assert_eq!(
            Challenge::parse("Basic realm=\"Registry Realm\"").unwrap(),
            Challenge::Basic
        );
        assert!(Challenge::parse("Bearer service=\"x\"").is_err());
        assert!(Challenge::parse("Bearer realm=\"ftp://x/token\"").is_err());
        assert!(Challenge::parse("Negotiate abc").is_err());
        assert!(Challenge::parse("").is_err());
    }
}
