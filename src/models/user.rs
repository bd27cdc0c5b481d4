use crate::{
    database::{get_db, paginate},
    error::ApiError,
    response::{PageQuery, Pagination},
    utils::{from_bson_date, is_valid_email},
};
use actix_service::{self, Transform};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse},
    Error, HttpMessage, HttpRequest,
};
use chrono::{DateTime, Utc};
use futures::{
    future::{ready, LocalBoxFuture, Ready},
    FutureExt,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    Collection,
};
use once_cell::sync::OnceCell;
use pwhash::bcrypt;
use serde::{Deserialize, Serialize};
use std::{rc::Rc, str::FromStr};

use super::role::{AccessScope, UserRole};

const COLLECTION: &str = "users";
const ISSUER: &str = "cmms-server";
pub const AUTH_COOKIE: &str = "auth-token";

static KEYS: OnceCell<TokenKeys> = OnceCell::new();

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_hours: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserClaims {
    exp: i64,
    iat: i64,
    iss: String,
    sub: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    pub department: Option<String>,
    pub employee_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: BsonDateTime,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct UserCredential {
    pub email: String,
    pub password: String,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub department: Option<String>,
    pub employee_id: Option<String>,
}
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub department: Option<String>,
    pub employee_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub department: Option<String>,
}

/// Caller identity attached to the request by [`UserAuthenticationMiddleware`].
#[derive(Debug, Clone)]
pub struct UserAuthenticationData {
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub department: Option<String>,
    pub employee_id: Option<String>,
    pub token: String,
}
pub struct UserAuthenticationMiddleware<S> {
    service: Rc<S>,
}
pub struct UserAuthenticationMiddlewareFactory;

pub type UserAuthentication = Rc<UserAuthenticationData>;

fn default_active() -> bool {
    true
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            _id: user._id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            role: user.role,
            department: user.department,
            employee_id: user.employee_id,
            is_active: user.is_active,
            created_at: from_bson_date(user.created_at),
        }
    }
}

impl UserAuthenticationData {
    pub fn actor(&self) -> super::Actor {
        super::Actor {
            id: self.id.to_hex(),
            name: self.name.clone(),
        }
    }
}

/// Identity of the caller or `401 UNAUTHORIZED`.
pub fn current_user(req: &HttpRequest) -> Result<UserAuthentication, ApiError> {
    req.extensions()
        .get::<UserAuthentication>()
        .cloned()
        .ok_or(ApiError::Unauthorized)
}

fn collection() -> Result<Collection<User>, ApiError> {
    Ok(get_db()?.collection::<User>(COLLECTION))
}

impl User {
    pub fn from_request(payload: UserRequest, role: UserRole) -> Result<Self, ApiError> {
        if payload.password.len() < 8 {
            return Err(ApiError::validation("USER_MUST_HAVE_VALID_PASSWORD"));
        }
        if !is_valid_email(&payload.email) {
            return Err(ApiError::validation("USER_MUST_HAVE_VALID_EMAIL"));
        }
        if payload.name.trim().is_empty() {
            return Err(ApiError::validation("USER_MUST_HAVE_NAME"));
        }
        Ok(Self {
            _id: None,
            name: payload.name.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            password: payload.password,
            role,
            department: payload.department,
            employee_id: payload.employee_id,
            is_active: true,
            created_at: BsonDateTime::now(),
        })
    }
    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        let collection = collection()?;

        self._id = Some(ObjectId::new());
        self.password =
            bcrypt::hash(&self.password).map_err(|_| ApiError::internal("HASHING_FAILED"))?;

        collection.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn count() -> Result<u64, ApiError> {
        Ok(collection()?.count_documents(doc! {}, None).await?)
    }
    /// Admins outside `super_admin` only ever see their own department.
    fn list_filter(query: &UserQuery, scope: &AccessScope) -> Document {
        let mut filter = scope.filter("department", &[]);
        if let Some(role) = query.role {
            filter.insert("role", role.as_str());
        }
        if let Some(department) = scope.department_filter(query.department.as_deref()) {
            filter.insert("department", department);
        }
        filter
    }
    pub async fn find_many(
        query: &UserQuery,
        page: &PageQuery,
        scope: &AccessScope,
    ) -> Result<(Vec<UserResponse>, Pagination), ApiError> {
        let filter = User::list_filter(query, scope);
        let sort = page.sort(&["name", "email", "createdAt"], "createdAt");
        let (users, pagination) = paginate(&collection()?, filter, sort, page).await?;
        Ok((users.into_iter().map(UserResponse::from).collect(), pagination))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<User>, ApiError> {
        Ok(collection()?.find_one(doc! { "_id": _id }, None).await?)
    }
    pub async fn find_by_email(email: &str) -> Result<Option<User>, ApiError> {
        Ok(collection()?
            .find_one(doc! { "email": email.trim().to_lowercase() }, None)
            .await?)
    }
}

impl UserCredential {
    /// Unknown, inactive and wrong-password logins fail the same way.
    fn check(&self, user: Option<User>) -> Result<User, ApiError> {
        match user {
            Some(user) if user.is_active && bcrypt::verify(&self.password, &user.password) => Ok(user),
            _ => Err(ApiError::InvalidCredentials),
        }
    }
    pub async fn authenticate(&self) -> Result<(String, User), ApiError> {
        let user = self.check(User::find_by_email(&self.email).await?)?;
        let id = user._id.ok_or_else(|| ApiError::internal("USER_WITHOUT_ID"))?;
        Ok((issue_token(&id)?, user))
    }
    pub fn verify(token: &str) -> Option<ObjectId> {
        let keys = KEYS.get()?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        let data = decode::<UserClaims>(token, &keys.decoding, &validation).ok()?;
        ObjectId::from_str(&data.claims.sub).ok()
    }
}

pub fn issue_token(user_id: &ObjectId) -> Result<String, ApiError> {
    let keys = KEYS
        .get()
        .ok_or_else(|| ApiError::internal("KEYS_NOT_LOADED"))?;
    let now = Utc::now().timestamp();
    let claims = UserClaims {
        sub: user_id.to_hex(),
        iat: now,
        exp: now + keys.expiry_hours * 3600,
        iss: ISSUER.to_string(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
        .map_err(|_| ApiError::internal("GENERATING_FAILED"))
}

pub fn load_keys(secret: &str, expiry_hours: i64) {
    let _ = KEYS.set(TokenKeys {
        encoding: EncodingKey::from_secret(secret.as_bytes()),
        decoding: DecodingKey::from_secret(secret.as_bytes()),
        expiry_hours,
    });
}

fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(header) = req.headers().get("Authorization") {
        if let Some(token) = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
        {
            return Some(token.trim().to_string());
        }
    }
    req.cookie(AUTH_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

impl<S, B> Service<ServiceRequest> for UserAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv: Rc<S> = self.service.clone();

        async move {
            if let Some(token) = extract_token(&req) {
                if let Some(_id) = UserCredential::verify(&token) {
                    match User::find_by_id(&_id).await {
                        Ok(Some(user)) if user.is_active => {
                            let auth_data = UserAuthenticationData {
                                id: _id,
                                name: user.name,
                                email: user.email,
                                role: user.role,
                                department: user.department,
                                employee_id: user.employee_id,
                                token,
                            };
                            req.extensions_mut()
                                .insert::<UserAuthentication>(Rc::new(auth_data));
                        }
                        Ok(_) => tracing::debug!(user_id = %_id, "token for unknown or inactive user"),
                        Err(error) => tracing::warn!(%error, "failed to load authenticated user"),
                    }
                }
            }
            let res: ServiceResponse<B> = srv.call(req).await?;
            Ok(res)
        }
        .boxed_local()
    }
}
impl<S, B> Transform<S, ServiceRequest> for UserAuthenticationMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = UserAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(UserAuthenticationMiddleware {
            service: Rc::new(service),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{get, test as actix_test, App, HttpResponse};

    #[get("/whoami")]
    async fn whoami(req: HttpRequest) -> Result<HttpResponse, ApiError> {
        let user = current_user(&req)?;
        Ok(HttpResponse::Ok().body(user.name.clone()))
    }

    #[test]
    fn issued_token_verifies_to_same_user() {
        load_keys("test-secret", 1);
        let id = ObjectId::new();
        let token = issue_token(&id).unwrap();
        assert_eq!(UserCredential::verify(&token), Some(id));
        assert_eq!(UserCredential::verify("garbage"), None);
    }

    #[actix_web::test]
    async fn anonymous_request_is_rejected_by_handler() {
        let app = actix_test::init_service(
            App::new()
                .wrap(UserAuthenticationMiddlewareFactory)
                .service(whoami),
        )
        .await;
        let req = actix_test::TestRequest::get().uri("/whoami").to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bad_logins_are_unauthorized() {
        use actix_web::ResponseError;

        let mut user = User::from_request(
            UserRequest {
                name: "Tech".to_string(),
                email: "tech@plant.example.com".to_string(),
                password: "correct-horse".to_string(),
                role: None,
                department: None,
                employee_id: None,
            },
            UserRole::NormalUser,
        )
        .unwrap();
        user.password = bcrypt::hash("correct-horse").unwrap();
        let login = |password: &str| UserCredential {
            email: "tech@plant.example.com".to_string(),
            password: password.to_string(),
        };

        assert!(login("correct-horse").check(Some(user.clone())).is_ok());
        for error in [
            login("wrong-horse").check(Some(user.clone())).unwrap_err(),
            login("correct-horse").check(None).unwrap_err(),
            login("correct-horse")
                .check(Some(User { is_active: false, ..user.clone() }))
                .unwrap_err(),
        ] {
            assert_eq!(error.status_code(), actix_web::http::StatusCode::UNAUTHORIZED);
            assert_eq!(error.to_string(), "INVALID_COMBINATION");
        }
    }

    #[test]
    fn user_listing_stays_in_the_admins_department() {
        let scope = |role| AccessScope {
            role,
            department: Some("Electrical".to_string()),
            user_id: ObjectId::new().to_hex(),
            employee_id: None,
        };
        let query = UserQuery {
            role: Some(UserRole::Manager),
            department: Some("Mechanical".to_string()),
        };

        assert_eq!(
            User::list_filter(&query, &scope(UserRole::Admin)),
            doc! { "department": "Electrical", "role": "manager" }
        );
        assert_eq!(
            User::list_filter(&query, &scope(UserRole::SuperAdmin)),
            doc! { "role": "manager", "department": "Mechanical" }
        );
        assert_eq!(
            User::list_filter(&UserQuery { role: None, department: None }, &scope(UserRole::SuperAdmin)),
            Document::new()
        );
    }

    #[test]
    fn weak_password_is_rejected() {
        let payload = UserRequest {
            name: "Tech".to_string(),
            email: "tech@plant.example.com".to_string(),
            password: "short".to_string(),
            role: None,
            department: None,
            employee_id: None,
        };
        assert!(User::from_request(payload, UserRole::NormalUser).is_err());
    }
}
