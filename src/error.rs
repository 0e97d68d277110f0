//! Error type for the dispatch operations

use thiserror::Error;
use waste_dispatch_auth::AuthError;
use waste_dispatch_postgrest::PostgrestError;
use waste_dispatch_realtime::RealtimeError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration error: Missing or invalid {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Postgrest(#[from] PostgrestError),

    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// User-facing operations, each with its own failure message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SignIn,
    SignUp,
    SignOut,
    LoadProfile,
    RequestCollection,
    LoadStats,
    LoadRequests,
    AcceptRequest,
    RejectRequest,
    LoadActive,
    CompleteCollection,
    LoadDashboard,
    LoadAdmin,
    Export,
    Watch,
    Navigate,
}

impl Action {
    pub fn failure_message(&self) -> &'static str {
        match self {
            Action::SignIn => "Erreur de connexion. Vérifiez vos identifiants.",
            Action::SignUp => "Erreur lors de l'inscription. Veuillez réessayer.",
            Action::SignOut => "Impossible de se déconnecter",
            Action::LoadProfile => "Erreur lors du chargement du profil",
            Action::RequestCollection => "Impossible d'envoyer la demande de collecte",
            Action::LoadStats => "Erreur lors du chargement des statistiques",
            Action::LoadRequests => "Erreur lors de la récupération des demandes",
            Action::AcceptRequest => "Impossible d'accepter la demande",
            Action::RejectRequest => "Impossible de refuser la demande",
            Action::LoadActive => "Erreur lors de la récupération des collectes actives",
            Action::CompleteCollection => "Impossible de marquer comme terminé",
            Action::LoadDashboard => "Erreur lors du chargement du tableau de bord",
            Action::LoadAdmin => "Erreur lors du chargement des données",
            Action::Export => "Impossible d'exporter les collectes",
            Action::Watch => "Erreur de chargement",
            Action::Navigate => "Erreur inattendue",
        }
    }
}

impl DispatchError {
    /// Message shown to the user when `action` fails with this error.
    ///
    /// Validation failures carry their own text; everything else collapses
    /// to the action's fixed message.
    pub fn user_message(&self, action: Action) -> String {
        match self {
            DispatchError::InvalidInput(message) => message.clone(),
            _ => action.failure_message().to_string(),
        }
    }
}
