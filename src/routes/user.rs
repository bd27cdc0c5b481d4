use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    get, post, web, HttpRequest, HttpResponse,
};

use crate::{
    error::ApiError,
    models::{
        role::{AccessScope, UserRole},
        user::{
            current_user, LoginResponse, User, UserAuthenticationData, UserCredential, UserQuery, UserRequest,
            UserResponse, AUTH_COOKIE,
        },
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

#[post("/auth/login")]
pub async fn login(payload: web::Json<UserCredential>) -> Result<HttpResponse, ApiError> {
    let (token, user) = payload.authenticate().await?;
    tracing::info!(user_id = ?user._id, "user logged in");

    let cookie = Cookie::build(AUTH_COOKIE, token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::days(1))
        .finish();
    let body = LoginResponse {
        token,
        user: UserResponse::from(user),
    };
    let mut response = ok("Login successful", body);
    response.add_cookie(&cookie).map_err(|_| ApiError::internal("COOKIE_NOT_SET"))?;
    Ok(response)
}

#[get("/auth/me")]
pub async fn get_me(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    match User::find_by_id(&issuer.id).await? {
        Some(user) => Ok(ok("User retrieved", UserResponse::from(user))),
        None => Err(ApiError::not_found("USER_NOT_FOUND")),
    }
}

#[get("/users")]
pub async fn get_users(
    query: web::Query<UserQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let (users, pagination) = User::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Users retrieved", users, pagination))
}

/// Role and department an admin may give a new account. Only a super admin
/// creates super admins or places users outside their own department.
fn placement(
    issuer: &UserAuthenticationData,
    role: Option<UserRole>,
    department: Option<String>,
) -> Result<(UserRole, Option<String>), ApiError> {
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let role = role.unwrap_or(UserRole::NormalUser);
    if role == UserRole::SuperAdmin && issuer.role != UserRole::SuperAdmin {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    Ok((role, AccessScope::of(issuer).resolve_department(department)))
}

/// The very first account bootstraps as `super_admin` without authentication;
/// afterwards only admins create users.
#[post("/users")]
pub async fn create_user(payload: web::Json<UserRequest>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let mut payload = payload.into_inner();

    let role = if User::count().await? == 0 {
        UserRole::SuperAdmin
    } else {
        let issuer = current_user(&req)?;
        let (role, department) = placement(&issuer, payload.role, payload.department.take())?;
        payload.department = department;
        role
    };

    let mut user = User::from_request(payload, role)?;
    if User::find_by_email(&user.email).await?.is_some() {
        return Err(ApiError::conflict("USER_ALREADY_EXIST"));
    }
    let _id = user.save().await?;
    tracing::info!(user_id = %_id, role = role.as_str(), "user created");

    match User::find_by_id(&_id).await? {
        Some(user) => Ok(created("User created", UserResponse::from(user))),
        None => Err(ApiError::internal("USER_NOT_SAVED")),
    }
}

#[get("/users/{user_id}")]
pub async fn get_user(user_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let user_id = parse_id(&user_id)?;
    if !issuer.role.is_admin() && issuer.id != user_id {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let user = User::find_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("USER_NOT_FOUND"))?;
    if issuer.id != user_id {
        AccessScope::of(&issuer).ensure(user.department.as_deref(), &[])?;
    }
    Ok(ok("User retrieved", UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    fn issuer(role: UserRole) -> UserAuthenticationData {
        UserAuthenticationData {
            id: ObjectId::new(),
            name: "Ana".to_string(),
            email: "ana@plant.example.com".to_string(),
            role,
            department: Some("Electrical".to_string()),
            employee_id: None,
            token: String::new(),
        }
    }

    #[test]
    fn admins_create_users_in_their_own_department() {
        let (role, department) = placement(
            &issuer(UserRole::Admin),
            Some(UserRole::Manager),
            Some("Mechanical".to_string()),
        )
        .unwrap();
        assert_eq!(role, UserRole::Manager);
        assert_eq!(department.as_deref(), Some("Electrical"));

        let (role, department) = placement(&issuer(UserRole::SuperAdmin), None, Some("Mechanical".to_string())).unwrap();
        assert_eq!(role, UserRole::NormalUser);
        assert_eq!(department.as_deref(), Some("Mechanical"));
    }

    #[test]
    fn only_super_admins_grant_super_admin() {
        assert!(placement(&issuer(UserRole::Admin), Some(UserRole::SuperAdmin), None).is_err());
        assert!(placement(&issuer(UserRole::Manager), None, None).is_err());
        assert!(placement(&issuer(UserRole::SuperAdmin), Some(UserRole::SuperAdmin), None).is_ok());
    }
}
