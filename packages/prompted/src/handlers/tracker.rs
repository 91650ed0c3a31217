use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    Form, Json,
    extract::{FromRequest, FromRequestParts, Query, Request, State},
};
use prompt_hub::StatusMessage;
use tracing::debug;

use crate::{AppState, actions};

/// Request fields from the query string and, for POST, a urlencoded body.
///
/// Body fields win over query fields of the same name. Never rejects: an
/// unreadable body just contributes no fields, and the tracker reports the
/// missing ones.
#[derive(Debug, Default)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let query = Query::<HashMap<String, String>>::from_request_parts(&mut parts, state).await;
        let mut fields = match query {
            Ok(Query(fields)) => fields,
            Err(e) => {
                debug!("ignoring unreadable query string: {e}");
                HashMap::new()
            }
        };

        let req = Request::from_parts(parts, body);
        match Form::<HashMap<String, String>>::from_request(req, state).await {
            Ok(Form(body_fields)) => fields.extend(body_fields),
            Err(e) => debug!("no form body: {e}"),
        }

        Ok(Self(fields))
    }
}

/// Submit a prompt (`prompt`)
pub async fn prompt_handler(
    State(state): State<AppState>,
    fields: FormFields,
) -> Json<StatusMessage> {
    let snapshot = actions::submit_prompt(&state, fields.get("prompt")).await;
    Json(snapshot.to_message())
}

/// Responder heartbeat (`secret`, `state`)
pub async fn heartbeat_handler(
    State(state): State<AppState>,
    fields: FormFields,
) -> Json<StatusMessage> {
    let snapshot = actions::heartbeat(&state, fields.get("secret"), fields.get("state")).await;
    Json(snapshot.to_message())
}

/// Answer the pending prompt (`secret`, `prompt`, `response`)
pub async fn respond_handler(
    State(state): State<AppState>,
    fields: FormFields,
) -> Json<StatusMessage> {
    let snapshot = actions::respond(
        &state,
        fields.get("secret"),
        fields.get("prompt"),
        fields.get("response"),
    )
    .await;
    Json(snapshot.to_message())
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusMessage> {
    Json(actions::status(&state).await.to_message())
}
