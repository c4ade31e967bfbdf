use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    app_error::AppError,
    beach_day::{EventFilter, NotificationFilter, NotificationRemoval},
    beach_day_error::BeachDayError,
    beaches::MAX_SEARCH_RESULTS,
    model::parse_event_time,
    scripts::WEATHER_SCRIPT,
    state::AppState,
};

type SharedState = State<Arc<AppState>>;
type Payload<T> = Result<Json<T>, JsonRejection>;

const SUCCESS: &str = "Success.";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/get_email", post(get_email))
        .route("/set_email", post(set_email))
        .route("/change_password", post(change_password))
        .route("/delete_account", post(delete_account))
        .route("/get_notifications_enabled", post(get_notifications_enabled))
        .route("/set_notifications_enabled", post(set_notifications_enabled))
        .route("/favorites", post(favorites))
        .route("/update_favorites", post(update_favorites))
        .route("/add_notification", post(add_notification))
        .route("/count_notifications", post(count_notifications))
        .route("/receive_notification", post(receive_notification))
        .route("/get_notifications", post(get_notifications))
        .route("/remove_notifications", post(remove_notifications))
        .route("/add_event", post(add_event))
        .route("/count_events", post(count_events))
        .route("/get_events", post(get_events))
        .route("/remove_events", post(remove_events))
        .route("/beach_info", post(beach_info))
        .route("/search_beaches", post(search_beaches))
        .route("/weather", post(weather))
}

/// Ids arrive as numbers or numeric strings; anything else counts as absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

fn required<T>(value: Option<T>) -> Result<T, AppError> {
    value.ok_or(AppError::Domain(BeachDayError::InvalidRequest))
}

fn success() -> Json<Value> {
    Json(json!({ "message": SUCCESS }))
}

#[derive(Deserialize)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct Authenticated {
    jwt: Option<String>,
}

#[derive(Deserialize)]
struct EmailRequest {
    jwt: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct PasswordRequest {
    jwt: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct EnabledRequest {
    jwt: Option<String>,
    enabled: Option<bool>,
}

#[derive(Deserialize)]
struct FavoritesRequest {
    jwt: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    favorite: Option<String>,
}

#[derive(Deserialize)]
struct NotificationRequest {
    jwt: Option<String>,
    title: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ByIdRequest {
    jwt: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<i64>,
}

#[derive(Deserialize)]
struct EventRequest {
    jwt: Option<String>,
    time: Option<String>,
    title: Option<String>,
    beach_id: Option<String>,
}

#[derive(Deserialize)]
struct BeachRequest {
    beach_id: Option<String>,
}

#[derive(Deserialize)]
struct SearchRequest {
    latitude: Option<f64>,
    longitude: Option<f64>,
    start: Option<usize>,
    stop: Option<usize>,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "message": "OK" }))
}

async fn register(
    State(state): SharedState,
    body: Payload<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    info!("register route accessed");
    let Json(body) = body?;
    state
        .beach_day
        .register(required(body.username)?, required(body.password)?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully." })),
    ))
}

async fn login(
    State(state): SharedState,
    body: Payload<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    info!("login route accessed");
    let Json(body) = body?;
    let token = state
        .beach_day
        .log_in(required(body.username)?, required(body.password)?)
        .await?;
    let cookie = format!("token={token}; HttpOnly; SameSite=Strict; Path=/");
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Login successful.", "token": token })),
    ))
}

async fn get_email(
    State(state): SharedState,
    body: Payload<Authenticated>,
) -> Result<impl IntoResponse, AppError> {
    info!("get_email route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let email = state.beach_day.get_email(username).await?;
    Ok(Json(json!({ "message": SUCCESS, "email": email })))
}

async fn set_email(
    State(state): SharedState,
    body: Payload<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("set_email route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    state.beach_day.set_email(username, body.email).await?;
    Ok(success())
}

async fn change_password(
    State(state): SharedState,
    body: Payload<PasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("change_password route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    state
        .beach_day
        .change_password(username, required(body.password)?)
        .await?;
    Ok(success())
}

async fn delete_account(
    State(state): SharedState,
    body: Payload<Authenticated>,
) -> Result<impl IntoResponse, AppError> {
    info!("delete_account route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    state.beach_day.delete_account(username).await?;
    Ok(success())
}

async fn get_notifications_enabled(
    State(state): SharedState,
    body: Payload<Authenticated>,
) -> Result<impl IntoResponse, AppError> {
    info!("get_notifications_enabled route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let enabled = state.beach_day.get_notifications_enabled(username).await?;
    Ok(Json(json!({ "message": SUCCESS, "enabled": enabled })))
}

async fn set_notifications_enabled(
    State(state): SharedState,
    body: Payload<EnabledRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("set_notifications_enabled route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    state
        .beach_day
        .set_notifications_enabled(username, required(body.enabled)?)
        .await?;
    Ok(success())
}

async fn favorites(
    State(state): SharedState,
    body: Payload<Authenticated>,
) -> Result<impl IntoResponse, AppError> {
    info!("favorites route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let favorites = state.beach_day.get_favorites(username).await?;
    Ok(Json(json!({ "message": SUCCESS, "favorites": favorites })))
}

async fn update_favorites(
    State(state): SharedState,
    body: Payload<FavoritesRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("update_favorites route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    match body.kind.as_deref() {
        Some("add") => {
            state
                .beach_day
                .add_favorite(username, required(body.favorite)?)
                .await?
        }
        Some("remove") => {
            state
                .beach_day
                .remove_favorite(username, required(body.favorite)?)
                .await?
        }
        Some("clear") => state.beach_day.clear_favorites(username).await?,
        _ => return Err(BeachDayError::InvalidRequest.into()),
    }
    Ok(success())
}

async fn add_notification(
    State(state): SharedState,
    body: Payload<NotificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("add_notification route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    state
        .beach_day
        .add_notification(username, body.title, body.message)
        .await?;
    Ok(success())
}

async fn count_notifications(
    State(state): SharedState,
    body: Payload<Authenticated>,
) -> Result<impl IntoResponse, AppError> {
    info!("count_notifications route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let count = state.beach_day.count_notifications(username).await?;
    Ok(Json(json!({ "message": SUCCESS, "count": count })))
}

async fn receive_notification(
    State(state): SharedState,
    body: Payload<ByIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("receive_notification route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    state
        .beach_day
        .receive_notification(username, body.id)
        .await?;
    Ok(success())
}

async fn get_notifications(
    State(state): SharedState,
    body: Payload<ByIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("get_notifications route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let notifications = match body.kind.as_deref() {
        Some("pending") => {
            let listings = state
                .beach_day
                .get_notifications(username, NotificationFilter::Pending)
                .await?;
            json!(listings)
        }
        Some("all") => {
            let listings = state
                .beach_day
                .get_notifications(username, NotificationFilter::All)
                .await?;
            json!(listings)
        }
        Some("by_id") => {
            let notification = state
                .beach_day
                .get_notification_by_id(username, body.id)
                .await?;
            json!([notification])
        }
        _ => return Err(BeachDayError::InvalidRequest.into()),
    };
    Ok(Json(
        json!({ "message": SUCCESS, "notifications": notifications }),
    ))
}

async fn remove_notifications(
    State(state): SharedState,
    body: Payload<ByIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("remove_notifications route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    match body.kind.as_deref() {
        Some("received") => {
            state
                .beach_day
                .remove_notifications(username, NotificationRemoval::Received)
                .await?
        }
        Some("all") => {
            state
                .beach_day
                .remove_notifications(username, NotificationRemoval::All)
                .await?
        }
        Some("by_id") => {
            state
                .beach_day
                .remove_notification_by_id(username, body.id)
                .await?
        }
        _ => return Err(BeachDayError::InvalidRequest.into()),
    }
    Ok(success())
}

async fn add_event(
    State(state): SharedState,
    body: Payload<EventRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("add_event route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let time = parse_event_time(&required(body.time)?)?;
    state
        .beach_day
        .add_event(username, time, body.title, required(body.beach_id)?)
        .await?;
    Ok(success())
}

async fn count_events(
    State(state): SharedState,
    body: Payload<Authenticated>,
) -> Result<impl IntoResponse, AppError> {
    info!("count_events route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let count = state.beach_day.count_events(username).await?;
    Ok(Json(json!({ "message": SUCCESS, "count": count })))
}

async fn get_events(
    State(state): SharedState,
    body: Payload<ByIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("get_events route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    let events = match body.kind.as_deref() {
        Some("future") => {
            let listings = state
                .beach_day
                .get_events(username, EventFilter::Future)
                .await?;
            json!(listings)
        }
        Some("all") => {
            let listings = state.beach_day.get_events(username, EventFilter::All).await?;
            json!(listings)
        }
        Some("by_id") => {
            let event = state.beach_day.get_event_by_id(username, body.id).await?;
            json!([event])
        }
        _ => return Err(BeachDayError::InvalidRequest.into()),
    };
    Ok(Json(json!({ "message": SUCCESS, "events": events })))
}

async fn remove_events(
    State(state): SharedState,
    body: Payload<ByIdRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("remove_events route accessed");
    let Json(body) = body?;
    let username = state.beach_day.authenticate(body.jwt.as_deref())?;
    match body.kind.as_deref() {
        Some("all") => state.beach_day.remove_events(username).await?,
        Some("by_id") => state.beach_day.remove_event_by_id(username, body.id).await?,
        _ => return Err(BeachDayError::InvalidRequest.into()),
    }
    Ok(success())
}

async fn beach_info(
    State(state): SharedState,
    body: Payload<BeachRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("beach_info route accessed");
    let Json(body) = body?;
    let info = state.beaches.beach_info(&required(body.beach_id)?)?;
    let mut response = json!(info);
    response["message"] = json!(SUCCESS);
    Ok(Json(response))
}

async fn search_beaches(
    State(state): SharedState,
    body: Payload<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("search_beaches route accessed");
    let Json(body) = body?;
    let start = body.start.unwrap_or(0);
    let found = state.beaches.search(
        required(body.latitude)?,
        required(body.longitude)?,
        start,
        body.stop.unwrap_or(start.saturating_add(MAX_SEARCH_RESULTS)),
    );
    Ok(Json(json!({
        "message": SUCCESS,
        "order": found.order,
        "result": found.result,
    })))
}

async fn weather(
    State(state): SharedState,
    body: Payload<Value>,
) -> Result<impl IntoResponse, AppError> {
    info!("weather route accessed");
    let Json(body) = body?;
    let forecast = state.scripts.run_json(WEATHER_SCRIPT, &body).await?;
    Ok(Json(forecast))
}
