use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};

use crate::models::{SetUpdate, WorkoutSession, WorkoutSet};

use super::WorkoutBackend;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// [`WorkoutBackend`] over the REST API, with optional bearer auth.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl WorkoutBackend for HttpBackend {
    async fn fetch_active(&self) -> Result<Option<WorkoutSession>> {
        let response = self
            .request(Method::GET, "/workouts/active")
            .send()
            .await
            .context("GET /workouts/active failed")?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let session = response
            .error_for_status()
            .context("GET /workouts/active returned an error")?
            .json::<WorkoutSession>()
            .await
            .context("failed to decode active workout")?;
        Ok(Some(session))
    }

    async fn fetch_workout(&self, workout_id: &str) -> Result<WorkoutSession> {
        self.request(Method::GET, &format!("/workouts/{workout_id}"))
            .send()
            .await
            .with_context(|| format!("GET /workouts/{workout_id} failed"))?
            .error_for_status()
            .with_context(|| format!("GET /workouts/{workout_id} returned an error"))?
            .json::<WorkoutSession>()
            .await
            .context("failed to decode workout")
    }

    async fn update_set(&self, set_id: &str, update: &SetUpdate) -> Result<()> {
        self.request(Method::PATCH, &format!("/workout-sets/{set_id}"))
            .json(update)
            .send()
            .await
            .with_context(|| format!("PATCH /workout-sets/{set_id} failed"))?
            .error_for_status()
            .with_context(|| format!("PATCH /workout-sets/{set_id} returned an error"))?;
        Ok(())
    }

    async fn add_set(&self, workout_exercise_id: &str) -> Result<WorkoutSet> {
        self.request(
            Method::POST,
            &format!("/workout-exercises/{workout_exercise_id}/sets"),
        )
        .send()
        .await
        .with_context(|| format!("POST /workout-exercises/{workout_exercise_id}/sets failed"))?
        .error_for_status()
        .with_context(|| {
            format!("POST /workout-exercises/{workout_exercise_id}/sets returned an error")
        })?
        .json::<WorkoutSet>()
        .await
        .context("failed to decode created set")
    }

    async fn delete_set(&self, set_id: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("/workout-sets/{set_id}"))
            .send()
            .await
            .with_context(|| format!("DELETE /workout-sets/{set_id} failed"))?
            .error_for_status()
            .with_context(|| format!("DELETE /workout-sets/{set_id} returned an error"))?;
        Ok(())
    }

    async fn complete_workout(&self, workout_id: &str) -> Result<()> {
        self.request(Method::POST, &format!("/workouts/{workout_id}/complete"))
            .send()
            .await
            .with_context(|| format!("POST /workouts/{workout_id}/complete failed"))?
            .error_for_status()
            .with_context(|| format!("POST /workouts/{workout_id}/complete returned an error"))?;
        Ok(())
    }
}
