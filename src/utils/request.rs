use std::{borrow::Cow, time::Duration};

use reqwest::Client;

pub(crate) const STATUS_OK: reqwest::StatusCode = reqwest::StatusCode::OK;

#[derive(Debug)]
pub enum ResponseErr {
    Reqwest(reqwest::Error),
    Status {
        msg: Cow<'static, str>,
        status: reqwest::StatusCode,
    },
    Other(Cow<'static, str>),
}

impl ResponseErr {
    pub(crate) fn bad_status<T: Into<Cow<'static, str>>>(
        ctx: T,
        response: reqwest::Response,
    ) -> Self {
        Self::Status {
            msg: ctx.into(),
            status: response.status(),
        }
    }
    crate::from_static_cow_fn!(Other, other);
}

impl From<reqwest::Error> for ResponseErr {
    fn from(err: reqwest::Error) -> Self {
        Self::Reqwest(err.without_url())
    }
}

impl std::fmt::Display for ResponseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseErr::Reqwest(err) => write!(f, "{err}"),
            ResponseErr::Status { msg, status } => write!(f, "{msg}: {status}"),
            ResponseErr::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ResponseErr {}

pub(crate) fn client_with_timeout(timeout: Duration) -> Result<Client, ResponseErr> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| {
            ResponseErr::other(format!(
                "TLS backend cannot be initialized, or the resolver cannot load the system configuration: {err}"
            ))
        })
}
