//! HTTP surface: routing, session cookies and JSON envelopes.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::admin::{GroupFilter, delete_group, facets, filter_groups, find_group};
use crate::auth::{authenticate, create_session, end_session, validate_session};
use crate::config::Config;
use crate::downloader::{groups_to_csv, groups_to_xlsx};
use crate::eligibility::{GroupRequest, available_students};
use crate::error::{AppError, AppResult, FileError, Rejection};
use crate::files::{FileStore, LocalFileStore, build_preview};
use crate::ledger::{group_of, load_groups, read_ledger};
use crate::mailer::Mailer;
use crate::model::{Group, Identity};
use crate::notify::{LogNotifier, Notifier};
use crate::roster::{Roster, labs_for, load_admins, load_courses, load_labs};
use crate::saving::WorkbookStore;
use crate::store::RecordStore;
use crate::submission::{SubmissionDesk, Upload};
use crate::writer::{GroupWriter, WriteReport};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session";

/// Largest accepted request body (submissions included).
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub files: Arc<dyn FileStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
}

type Shared = Arc<AppState>;

/// Failure sent to the browser as `{"status": "error", "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, "please log in")
    }

    fn forbidden() -> Self {
        ApiError::new(StatusCode::FORBIDDEN, "administrators only")
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match &err {
            AppError::Validation(Rejection::GroupNotFound { .. })
            | AppError::Validation(Rejection::SubmissionNotFound { .. })
            | AppError::Files(FileError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ConcurrencyConflict(_) | AppError::Files(FileError::Exists(_)) => {
                StatusCode::CONFLICT
            }
            AppError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Schema(_) | AppError::Files(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("{}", err);
        }
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run store-bound work off the async executor. Reads may sleep between retries.
async fn blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(ApiError::from)
}

fn current_identity(jar: &CookieJar) -> ApiResult<Identity> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| validate_session(cookie.value()))
        .ok_or_else(ApiError::unauthorized)
}

fn current_admin(jar: &CookieJar) -> ApiResult<Identity> {
    let identity = current_identity(jar)?;
    if identity.is_admin() {
        Ok(identity)
    } else {
        Err(ApiError::forbidden())
    }
}

/// The caller's group for `course`, or a rejection saying they have none.
fn require_group(state: &AppState, course: &str, email: &str) -> AppResult<Group> {
    let table = load_groups(&*state.store, &state.config.retry_policy())?;
    group_of(&table.groups, course, email)
        .cloned()
        .ok_or_else(|| {
            Rejection::NotInGroup {
                email: email.to_string(),
                course: course.to_string(),
            }
            .into()
        })
}

fn require_named_group(state: &AppState, course: &str, name: &str) -> AppResult<Group> {
    let table = load_groups(&*state.store, &state.config.retry_policy())?;
    find_group(&table.groups, course, name)
        .cloned()
        .ok_or_else(|| {
            Rejection::GroupNotFound {
                course: course.to_string(),
                name: name.to_string(),
            }
            .into()
        })
}

/// Build the state for `config`: workbook store, local uploads and SMTP or log notifier.
pub fn build_state(config: Config) -> Result<AppState, Box<dyn std::error::Error>> {
    let store = WorkbookStore::open(config.workbook_path())?;
    let files = LocalFileStore::new(config.uploads_dir(), &config.public_url);
    let notifier: Arc<dyn Notifier> = match config.smtp() {
        Some(settings) => Arc::new(Mailer::new(settings)?),
        None => {
            info!("no SMTP server configured, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };
    Ok(AppState {
        store: Arc::new(store),
        files: Arc::new(files),
        notifier,
        config,
    })
}

pub fn router(state: AppState) -> Router {
    let uploads = state.config.uploads_dir();
    let state: Shared = Arc::new(state);

    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/courses", get(courses))
        .route("/api/labs", get(labs))
        .route("/api/options", get(options))
        .route("/api/students", get(students))
        .route("/api/groups", post(create_group))
        .route("/api/my-group", get(my_group))
        .route(
            "/api/submissions",
            get(my_submissions).post(submit).delete(withdraw),
        )
        .route("/api/admin/groups", get(admin_groups))
        .route("/api/admin/groups/members", get(admin_members))
        .route("/api/admin/groups/delete", post(admin_delete))
        .route("/api/admin/facets", get(admin_facets))
        .route("/api/admin/export.csv", get(export_csv))
        .route("/api/admin/export.xlsx", get(export_xlsx))
        .route("/api/admin/submissions", get(admin_submissions))
        .route("/api/admin/grade", post(admin_grade))
        .route("/api/admin/grades", get(admin_grade_sheet))
        .route("/api/admin/preview", get(admin_preview))
        .nest_service("/files", ServeDir::new(uploads))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let app = router(build_state(config)?);

    let listener = TcpListener::bind(&bind).await?;
    info!("listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    status: &'static str,
    #[serde(flatten)]
    data: T,
}

/// Success envelope; `data` must serialize to a JSON object.
fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "ok",
        data,
    })
}

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

async fn login(
    State(state): State<Shared>,
    jar: CookieJar,
    Json(form): Json<LoginForm>,
) -> ApiResult<impl IntoResponse> {
    let lifetime = state.config.session_lifetime();
    let identity = blocking(move || {
        let retry = state.config.retry_policy();
        let roster = Roster::load(&*state.store, &retry)?;
        let admins = load_admins(&*state.store, &retry)?;
        authenticate(&roster, &admins, &form.email, &form.password)
    })
    .await?;

    let session_id = create_session(identity.clone(), lifetime);
    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true);
    Ok((jar.add(cookie), ok(identity)))
}

async fn logout(jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        end_session(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, ok(serde_json::json!({ "message": "logged out" })))
}

async fn me(jar: CookieJar) -> ApiResult<impl IntoResponse> {
    Ok(ok(current_identity(&jar)?))
}

async fn courses(State(state): State<Shared>, jar: CookieJar) -> ApiResult<impl IntoResponse> {
    current_identity(&jar)?;
    let courses = blocking(move || load_courses(&*state.store, &state.config.retry_policy())).await?;
    Ok(ok(serde_json::json!({ "courses": courses })))
}

#[derive(Deserialize)]
struct CourseQuery {
    course: String,
}

async fn labs(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<CourseQuery>,
) -> ApiResult<impl IntoResponse> {
    current_identity(&jar)?;
    let labs = blocking(move || {
        let labs = load_labs(&*state.store, &state.config.retry_policy())?;
        Ok(labs_for(&labs, &q.course))
    })
    .await?;
    Ok(ok(serde_json::json!({ "labs": labs })))
}

#[derive(Deserialize)]
struct OptionsQuery {
    faculty: Option<String>,
}

async fn options(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<OptionsQuery>,
) -> ApiResult<impl IntoResponse> {
    current_identity(&jar)?;
    let (faculties, programs) = blocking(move || {
        let roster = Roster::load(&*state.store, &state.config.retry_policy())?;
        let programs = q
            .faculty
            .as_deref()
            .map(|f| roster.programs(f))
            .unwrap_or_default();
        Ok((roster.faculties(), programs))
    })
    .await?;
    Ok(ok(serde_json::json!({ "faculties": faculties, "programs": programs })))
}

#[derive(Deserialize)]
struct StudentsQuery {
    course: String,
    faculty: Option<String>,
    program: Option<String>,
}

#[derive(Serialize)]
struct StudentOption {
    email: String,
    label: String,
}

async fn students(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<StudentsQuery>,
) -> ApiResult<impl IntoResponse> {
    let identity = current_identity(&jar)?;
    let options = blocking(move || {
        let retry = state.config.retry_policy();
        let roster = Roster::load(&*state.store, &retry)?;
        let table = load_groups(&*state.store, &retry)?;
        let view = read_ledger(&table.groups, &q.course, &identity.email);
        Ok(available_students(
            &roster,
            &view,
            &identity.email,
            q.faculty.as_deref(),
            q.program.as_deref(),
        )
        .into_iter()
        .map(|s| StudentOption {
            email: s.email.clone(),
            label: s.display_label(),
        })
        .collect::<Vec<_>>())
    })
    .await?;
    Ok(ok(serde_json::json!({ "students": options })))
}

#[derive(Deserialize)]
struct GroupForm {
    course: String,
    #[serde(default)]
    faculty: String,
    #[serde(default)]
    department: String,
    name: String,
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Serialize)]
struct CreatedGroup {
    #[serde(flatten)]
    report: WriteReport,
    /// Saved, but some members were not notified
    partial_failure: bool,
}

async fn create_group(
    State(state): State<Shared>,
    jar: CookieJar,
    Json(form): Json<GroupForm>,
) -> ApiResult<impl IntoResponse> {
    let requester = current_identity(&jar)?;
    let report = blocking(move || {
        let retry = state.config.retry_policy();
        let roster = Roster::load(&*state.store, &retry)?;
        let request = GroupRequest {
            requester,
            course: form.course,
            faculty: form.faculty,
            department: form.department,
            name: form.name,
            members: form.members,
        };
        GroupWriter::new(&*state.store, &*state.notifier, &roster, retry).create(&request)
    })
    .await?;
    Ok(ok(CreatedGroup {
        partial_failure: report.is_partial_failure(),
        report,
    }))
}

async fn my_group(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<CourseQuery>,
) -> ApiResult<impl IntoResponse> {
    let identity = current_identity(&jar)?;
    let group = blocking(move || {
        let table = load_groups(&*state.store, &state.config.retry_policy())?;
        Ok(group_of(&table.groups, &q.course, &identity.email).cloned())
    })
    .await?;
    Ok(ok(serde_json::json!({ "group": group })))
}

async fn my_submissions(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<CourseQuery>,
) -> ApiResult<impl IntoResponse> {
    let identity = current_identity(&jar)?;
    let submissions = blocking(move || {
        let group = require_group(&state, &q.course, &identity.email)?;
        let desk = SubmissionDesk::new(&*state.store, &*state.files, state.config.retry_policy());
        Ok(desk
            .list(&group.course, None)?
            .into_iter()
            .filter(|s| s.group_name == group.name)
            .collect::<Vec<_>>())
    })
    .await?;
    Ok(ok(serde_json::json!({ "submissions": submissions })))
}

async fn submit(
    State(state): State<Shared>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let identity = current_identity(&jar)?;
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
    };

    let (mut course, mut lab, mut upload) = (String::new(), String::new(), None);
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "course" => course = field.text().await.map_err(bad_form)?,
            "lab" => lab = field.text().await.map_err(bad_form)?,
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_form)?.to_vec();
                upload = Some(Upload { file_name, bytes });
            }
            _ => {}
        }
    }
    let upload = upload.ok_or_else(|| ApiError::from(AppError::from(Rejection::EmptyUpload)))?;

    let submission = blocking(move || {
        let retry = state.config.retry_policy();
        let group = require_group(&state, &course, &identity.email)?;
        let labs = labs_for(&load_labs(&*state.store, &retry)?, &group.course);
        SubmissionDesk::new(&*state.store, &*state.files, retry).submit(
            &group,
            &lab,
            &identity.email,
            upload,
            &labs,
        )
    })
    .await?;
    Ok(ok(submission))
}

#[derive(Deserialize)]
struct LabQuery {
    course: String,
    lab: String,
}

async fn withdraw(
    State(state): State<Shared>,
    jar: CookieJar,
    Json(q): Json<LabQuery>,
) -> ApiResult<impl IntoResponse> {
    let identity = current_identity(&jar)?;
    let removed = blocking(move || {
        let group = require_group(&state, &q.course, &identity.email)?;
        SubmissionDesk::new(&*state.store, &*state.files, state.config.retry_policy())
            .delete(&group, &q.lab, &identity.email)
    })
    .await?;
    Ok(ok(removed))
}

async fn admin_groups(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(filter): Query<GroupFilter>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let groups = blocking(move || {
        let table = load_groups(&*state.store, &state.config.retry_policy())?;
        Ok(filter_groups(&table.groups, &filter)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>())
    })
    .await?;
    Ok(ok(serde_json::json!({ "groups": groups })))
}

#[derive(Deserialize)]
struct FacetQuery {
    faculty: Option<String>,
    department: Option<String>,
}

async fn admin_facets(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<FacetQuery>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let facets = blocking(move || {
        let table = load_groups(&*state.store, &state.config.retry_policy())?;
        Ok(facets(
            &table.groups,
            q.faculty.as_deref(),
            q.department.as_deref(),
        ))
    })
    .await?;
    Ok(ok(facets))
}

#[derive(Deserialize)]
struct NamedGroup {
    course: String,
    name: String,
}

#[derive(Serialize)]
struct Member {
    email: String,
    name: String,
}

async fn admin_members(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<NamedGroup>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let members = blocking(move || {
        let group = require_named_group(&state, &q.course, &q.name)?;
        Ok(group
            .roster()
            .map(|(email, name)| Member {
                email: email.to_string(),
                name: name.to_string(),
            })
            .collect::<Vec<_>>())
    })
    .await?;
    Ok(ok(serde_json::json!({ "members": members })))
}

async fn admin_delete(
    State(state): State<Shared>,
    jar: CookieJar,
    Json(q): Json<NamedGroup>,
) -> ApiResult<impl IntoResponse> {
    let admin = current_admin(&jar)?;
    let removed = blocking(move || {
        delete_group(
            &*state.store,
            &state.config.retry_policy(),
            &q.course,
            &q.name,
        )
    })
    .await?;
    info!("{} deleted group '{}'", admin.email, removed.name);
    Ok(ok(removed))
}

async fn filtered_groups(state: Shared, filter: GroupFilter) -> ApiResult<Vec<Group>> {
    blocking(move || {
        let table = load_groups(&*state.store, &state.config.retry_policy())?;
        Ok(filter_groups(&table.groups, &filter)
            .into_iter()
            .cloned()
            .collect())
    })
    .await
}

async fn export_csv(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(filter): Query<GroupFilter>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let groups = filtered_groups(state, filter).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"groups.csv\"",
            ),
        ],
        groups_to_csv(&groups),
    ))
}

async fn export_xlsx(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(filter): Query<GroupFilter>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let groups = filtered_groups(state, filter).await?;
    let bytes = groups_to_xlsx(&groups)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"groups.xlsx\"",
            ),
        ],
        bytes,
    ))
}

#[derive(Deserialize)]
struct SubmissionsQuery {
    course: String,
    lab: Option<String>,
}

async fn admin_submissions(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<SubmissionsQuery>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let submissions = blocking(move || {
        SubmissionDesk::new(&*state.store, &*state.files, state.config.retry_policy())
            .list(&q.course, q.lab.as_deref())
    })
    .await?;
    Ok(ok(serde_json::json!({ "submissions": submissions })))
}

#[derive(Deserialize)]
struct GradeForm {
    course: String,
    group: String,
    lab: String,
    score: String,
}

async fn admin_grade(
    State(state): State<Shared>,
    jar: CookieJar,
    Json(form): Json<GradeForm>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let graded = blocking(move || {
        let group = require_named_group(&state, &form.course, &form.group)?;
        SubmissionDesk::new(&*state.store, &*state.files, state.config.retry_policy())
            .grade(&group, &form.lab, &form.score)
    })
    .await?;
    Ok(ok(graded))
}

async fn admin_grade_sheet(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<LabQuery>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let entries = blocking(move || {
        SubmissionDesk::new(&*state.store, &*state.files, state.config.retry_policy())
            .grade_sheet(&q.course, &q.lab)
    })
    .await?;
    Ok(ok(serde_json::json!({ "grades": entries })))
}

#[derive(Deserialize)]
struct PreviewQuery {
    course: String,
    group: String,
    lab: String,
}

async fn admin_preview(
    State(state): State<Shared>,
    jar: CookieJar,
    Query(q): Query<PreviewQuery>,
) -> ApiResult<impl IntoResponse> {
    current_admin(&jar)?;
    let preview = blocking(move || {
        let desk = SubmissionDesk::new(&*state.store, &*state.files, state.config.retry_policy());
        let submission = desk
            .find(&q.group, &q.course, &q.lab)?
            .ok_or_else(|| Rejection::SubmissionNotFound { lab: q.lab.clone() })?;
        Ok(build_preview(
            &*state.files,
            &submission.file_name,
            &submission.file_link,
        )?)
    })
    .await?;
    Ok(ok(preview))
}
