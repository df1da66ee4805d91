use crate::errors::ImageError;
use regex::Regex;
use std::ops::Range;

/// Name of a Docker-style image registry server
///
/// This is a domain name with an optional port. The protocol is https,
/// except for domains without any dots (like `localhost` or `dev:5000`) which
/// get plain http, the same heuristic Docker uses for development setups.
#[derive(Clone)]
pub struct Registry {
    serialized: String,
    domain_pos: Range<usize>,
    port: Option<u16>,
    is_https: bool,
}

serialized_identity!(Registry);

impl Registry {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Registry]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Registry::regex_str())).unwrap();
        }
        let invalid = || ImageError::InvalidReferenceFormat(s.to_owned());
        let captures = RE.captures(s).ok_or_else(invalid)?;
        let domain = captures.name("reg_d").ok_or_else(invalid)?;
        let port = match captures.name("reg_p") {
            None => None,
            Some(m) => Some(m.as_str().parse::<u16>().map_err(|_| invalid())?),
        };
        Ok(Registry {
            serialized: s.to_owned(),
            domain_pos: domain.range(),
            is_https: domain.as_str().contains('.'),
            port,
        })
    }

    pub fn domain_str(&self) -> &str {
        &self.serialized[self.domain_pos.clone()]
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn is_https(&self) -> bool {
        self.is_https
    }

    /// Either "http" or "https"
    pub fn protocol_str(&self) -> &str {
        if self.is_https() {
            "https"
        } else {
            "http"
        }
    }

    /// Root of the registry's v2 API, like `https://gcr.io/v2/`
    pub fn api_base(&self) -> String {
        format!("{}://{}/v2/", self.protocol_str(), self.serialized)
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<reg>",
            /*  */ "(?P<reg_d>",
            /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
            /* -- */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*",
            /*  */ ")",
            /*  */ "(?::(?P<reg_p>[0-9]+))?",
            ")",
        )
    }
}
