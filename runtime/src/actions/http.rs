//! `request_get`: blocking HTTP GET of the working value.
//!
//! No retries: a transport failure or a non-2xx status aborts the pipeline.

use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use super::{Action, ActionContext, BoundArgs, Param, Registry};
use crate::config::Config;
use crate::pipeline::error::ActionError;
use crate::pipeline::value::Value;

pub fn register(registry: &mut Registry, config: &Config) {
    registry.register(RequestGet::new(config));
}

/// Resolve `target` against the anchor, if the anchor is itself a URL.
pub fn resolve_url(anchor: &str, target: &str) -> Result<Url, ActionError> {
    let target = target.trim();
    let joined = match Url::parse(anchor) {
        Ok(base) => base.join(target),
        Err(_) => Url::parse(target),
    };
    joined.map_err(|e| ActionError::Malformed {
        what: "URL",
        message: format!("'{target}': {e}"),
    })
}

pub struct RequestGet {
    client: reqwest::blocking::Client,
}

impl RequestGet {
    pub fn new(config: &Config) -> Self {
        let client = build_client(config).unwrap_or_else(|e| {
            warn!(
                error = %e,
                "HTTP client settings rejected, falling back to reqwest defaults"
            );
            reqwest::blocking::Client::default()
        });
        Self { client }
    }
}

fn build_client(config: &Config) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .user_agent(config.user_agent.as_str())
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .build()
}

const PARAMS: &[Param] = &[Param::optional_dict("headers")];

impl Action for RequestGet {
    fn name(&self) -> &'static str {
        "request_get"
    }

    fn params(&self) -> &'static [Param] {
        PARAMS
    }

    fn summary(&self) -> &'static str {
        "GET the URL in the working value (relative to the anchor); yields the body"
    }

    fn apply(
        &self,
        cx: &mut ActionContext<'_>,
        input: Value,
        args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let target = input.into_string()?;
        let url = resolve_url(cx.anchor, &target)?;

        let mut request = self.client.get(url.clone());
        for (name, value) in args.dict("headers").unwrap_or_default() {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(%url, "fetching");
        let http_error = |source| ActionError::Http {
            url: url.to_string(),
            source,
        };
        let response = request.send().map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(http_error)?;
        debug!(%url, status = status.as_u16(), bytes = body.len(), "fetched");
        Ok(Value::String(body))
    }
}
