//! Actor directory model, roles and authentication claims

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Role held by an actor in the fleet organisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Driver,
    Supervisor,
    FleetManager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requester => "requester",
            Role::Driver => "driver",
            Role::Supervisor => "supervisor",
            Role::FleetManager => "fleet_manager",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "requester" => Ok(Role::Requester),
            "driver" => Ok(Role::Driver),
            "supervisor" => Ok(Role::Supervisor),
            "fleet_manager" => Ok(Role::FleetManager),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Internal row structure for actor queries
#[derive(Debug, Clone, FromRow)]
pub struct ActorRow {
    id: Uuid,
    name: String,
    role: String,
    supervisor_id: Option<Uuid>,
}

impl TryFrom<ActorRow> for Actor {
    type Error = AppError;

    fn try_from(row: ActorRow) -> Result<Self, Self::Error> {
        Ok(Actor {
            id: row.id,
            name: row.name,
            role: row.role.parse().map_err(AppError::Internal)?,
            supervisor_id: row.supervisor_id,
        })
    }
}

/// Directory entry for a person acting on bookings and trips
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    /// Supervisor entitled to approve this actor's requests
    pub supervisor_id: Option<Uuid>,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fleet managers and admins may allocate, cancel and operate any trip
    pub fn has_fleet_authority(&self) -> bool {
        matches!(self.role, Role::FleetManager | Role::Admin)
    }

    /// Whether this actor may approve or reject a request made by `requester`
    pub fn may_decide_for(&self, requester: &Actor) -> bool {
        self.is_admin()
            || (self.role == Role::Supervisor && requester.supervisor_id == Some(self.id))
    }

    pub fn require_supervisor_of(&self, requester: &Actor) -> AppResult<()> {
        if self.may_decide_for(requester) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "{} has no supervisor authority over {}",
                self.name, requester.name
            )))
        }
    }

    pub fn require_fleet_authority(&self) -> AppResult<()> {
        if self.has_fleet_authority() {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "Fleet manager or administrator role required".to_string(),
            ))
        }
    }
}

/// JWT claims; carries identity only, roles are resolved from the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorClaims {
    pub sub: String,
    pub actor_id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl ActorClaims {
    pub fn new(actor_id: Uuid, expiration_hours: u64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: actor_id.to_string(),
            actor_id,
            exp: now + (expiration_hours as i64) * 3600,
            iat: now,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}
