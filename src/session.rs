//! Sign-in, sign-up, sign-out and role routing

use crate::client::{DispatchClient, PROFILES};
use crate::error::{DispatchError, Result};
use crate::models::Role;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

/// Where a user lands after authenticating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Home {
    Login,
    Consumer,
    Collector,
}

impl Home {
    /// Collectors get their own area; everyone else, admins included, lands on the consumer home.
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Collector => Home::Collector,
            Role::User | Role::Admin => Home::Consumer,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<()> {
        let fields = [&self.full_name, &self.phone, &self.email, &self.password];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(DispatchError::InvalidInput(
                "Veuillez remplir tous les champs".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    /// Account created and signed in
    Registered,
    /// Account created but the email must be confirmed before signing in
    AwaitingConfirmation,
}

#[derive(Deserialize)]
struct RoleRow {
    #[serde(default)]
    role: Role,
}

impl DispatchClient {
    /// Sign in and pick the landing area from the profile role
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Home> {
        let session = self.auth().sign_in_with_password(email, password).await?;
        self.realtime()
            .set_auth(Some(session.access_token.clone()))
            .await;
        Ok(self.route_by_role().await)
    }

    /// Register a new account; the profile carries the name and phone
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn signup(&self, form: &SignupForm) -> Result<SignupOutcome> {
        form.validate()?;

        let response = self
            .auth()
            .sign_up(
                form.email.trim(),
                &form.password,
                json!({
                    "full_name": form.full_name.trim(),
                    "phone": form.phone.trim(),
                }),
            )
            .await?;

        if response.session().is_none() {
            info!("sign-up awaiting email confirmation");
            return Ok(SignupOutcome::AwaitingConfirmation);
        }

        // a missing profile row reads as a plain user
        if let Err(e) = self.write_profile(form).await {
            warn!(error = %e, "profile write after sign-up failed");
        }

        Ok(SignupOutcome::Registered)
    }

    async fn write_profile(&self, form: &SignupForm) -> Result<()> {
        let user_id = self.current_user_id()?;
        let _: Vec<serde_json::Value> = self
            .from(PROFILES)?
            .on_conflict("id")
            .upsert(&json!({
                "id": user_id,
                "user_id": user_id,
                "full_name": form.full_name.trim(),
                "phone": form.phone.trim(),
            }))
            .await?;
        info!(%user_id, "profile written");
        Ok(())
    }

    /// Sign out and close the change feed
    pub async fn logout(&self) -> Result<()> {
        self.auth().sign_out().await?;
        self.realtime().disconnect().await?;
        self.realtime().set_auth(None).await;
        Ok(())
    }

    /// Landing area for the stored session, `Home::Login` without one
    pub async fn resume(&self) -> Home {
        if self.auth().get_session().is_none() {
            return Home::Login;
        }
        self.route_by_role().await
    }

    /// Role of the signed-in user. A missing profile row reads as a plain user.
    pub async fn current_role(&self) -> Result<Role> {
        let user_id = self.current_user_id()?;
        let row: Option<RoleRow> = self
            .from(PROFILES)?
            .select("role")
            .eq("id", &user_id.to_string())
            .single()
            .await?;
        Ok(row.map(|r| r.role).unwrap_or_default())
    }

    async fn route_by_role(&self) -> Home {
        match self.current_role().await {
            Ok(role) => Home::for_role(role),
            Err(e) => {
                warn!(error = %e, "role lookup failed, routing as consumer");
                Home::Consumer
            }
        }
    }
}
