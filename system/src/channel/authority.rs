use std::fmt;
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;

pub type AuthorityReceiver = mpsc::Receiver<(AuthorityRequest, oneshot::Sender<AuthorityResponse>)>;
pub type AuthoritySender = mpsc::Sender<(AuthorityRequest, oneshot::Sender<AuthorityResponse>)>;

const AUTHORITY: &str = "identifier authority";

#[derive(Clone, Debug)]
pub enum AuthorityRequest {
    IssueId,
}

impl AuthorityRequest {
    pub async fn build() -> (AuthoritySender, AuthorityReceiver) {
        let (authority_sender, authority_receiver) =
            mpsc::channel::<(AuthorityRequest, oneshot::Sender<AuthorityResponse>)>(64);

        (authority_sender, authority_receiver)
    }

    pub async fn issue_id(authority: &AuthoritySender) -> Result<u64, Error> {
        let (request, response) = oneshot::channel();

        authority
            .send((AuthorityRequest::IssueId, request))
            .await
            .map_err(|_| Error::Closed(AUTHORITY))?;

        match response.await.map_err(|_| Error::Closed(AUTHORITY))? {
            AuthorityResponse::Issued(num) => Ok(num),
            AuthorityResponse::Failed(error) => Err(error),
        }
    }
}

#[derive(Clone, Debug)]
pub enum AuthorityResponse {
    Issued(u64),
    Failed(Error),
}

impl fmt::Display for AuthorityResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority_response = "Authority Response |";

        match self {
            AuthorityResponse::Issued(num) => write!(f, "{} issued -> {}", authority_response, num),
            AuthorityResponse::Failed(error) => {
                write!(f, "{} failed -> {}", authority_response, error)
            }
        }
    }
}
