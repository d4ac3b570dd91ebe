use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::{Deserialize, Serialize, json::Json};
use rocket::{Shutdown, tokio::select};
use validator::Validate;

use crate::assignments::{
    AssignmentFilter, NewAssignment, create_assignment, filter_assignments, list_for_student,
    set_status,
};
use crate::auth::{
    AuthUser, Caller, Permission, SESSION_COOKIE, SignUp, SignedIn, complete_password_reset,
    request_password_reset, sign_in, sign_out, sign_up,
};
use crate::backend::Backend;
use crate::daily::{
    AllDays, SaveReport, StreakLevel, Totals, WeeklyPoint, get_all_days, get_day,
    observe_all_days, observe_day, save_daily_studies, streak_days, subject_week_total,
    week_points, week_totals,
};
use crate::dates::{
    DayKey, WeekOption, monday_iso, monday_of, parse_iso_date, to_iso, today, week_label,
    week_options,
};
use crate::draft::{ProgramDraft, commit_student_draft};
use crate::error::AppError;
use crate::models::{Assignment, AssignmentStatus, DayMap, Subject, Task, UserPublic, WeekTasks, WeeklyProgramDoc};
use crate::program::{
    Completion, ProgramStats, compute_stats, completion, fetch_for_student, fetch_for_teacher,
    only_completion_changed, require_week_start, save_teacher_program, week_tasks_of,
};
use crate::registry::{LinkOutcome, add_student_by_email, is_linked, list_coaches, list_students, observe_student_uids};
use crate::role::{UserRole, current_role, observe_role};
use crate::store::{DocumentStore, Observer};
use crate::validation::{ApiResult, AppErrorExt, JsonValidateExt, ToValidationResponse};

const WEEK_OPTION_LIMIT: usize = 12;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: AuthUser,
    pub role: UserRole,
}

fn set_session_cookie(cookies: &CookieJar<'_>, backend: &Backend, token: String) {
    let max_age = rocket::time::Duration::seconds(backend.settings().session_ttl.num_seconds());
    cookies.add_private(
        Cookie::build((SESSION_COOKIE, token))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(max_age),
    );
}

async fn me_for(backend: &Backend, signed_in: SignedIn, cookies: &CookieJar<'_>) -> ApiResult<Json<MeResponse>> {
    let role = current_role(backend.store().as_ref(), &signed_in.user.uid)
        .await
        .validate_custom()?;
    set_session_cookie(cookies, backend, signed_in.token);

    Ok(Json(MeResponse {
        user: signed_in.user,
        role,
    }))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(email(message = "Geçerli bir e-posta adresi girin."))]
    email: String,
    #[validate(length(min = 6, message = "Şifre en az 6 karakter olmalı."))]
    password: String,
    display_name: Option<String>,
    account_type: Option<String>,
}

#[post("/signup", data = "<request>")]
pub async fn api_signup(
    request: Json<SignUpRequest>,
    cookies: &CookieJar<'_>,
    backend: &State<Backend>,
) -> ApiResult<Json<MeResponse>> {
    let validated = request.validate_custom()?;

    let signed_in = sign_up(
        backend,
        SignUp {
            email: validated.email,
            password: validated.password,
            display_name: validated.display_name,
            account_type: validated.account_type,
        },
    )
    .await
    .validate_custom()?;

    me_for(backend, signed_in, cookies).await
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "E-posta gerekli."))]
    email: String,
    #[validate(length(min = 1, message = "Şifre gerekli."))]
    password: String,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    backend: &State<Backend>,
) -> ApiResult<Json<MeResponse>> {
    let validated = login.validate_custom()?;

    let signed_in = sign_in(backend, &validated.email, &validated.password)
        .await
        .validate_custom()?;

    me_for(backend, signed_in, cookies).await
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, backend: &State<Backend>) -> ApiResult<Status> {
    if let Some(token) = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
    {
        sign_out(backend, &token).await.validate_custom()?;
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));
    Ok(Status::Ok)
}

#[derive(Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Geçerli bir e-posta adresi girin."))]
    email: String,
}

/// Answers the same whether or not the address has an account.
#[post("/password-reset", data = "<request>")]
pub async fn api_password_reset(
    request: Json<PasswordResetRequest>,
    backend: &State<Backend>,
) -> ApiResult<Status> {
    let validated = request.validate_custom()?;
    request_password_reset(backend, &validated.email)
        .await
        .validate_custom()?;
    Ok(Status::Accepted)
}

#[derive(Deserialize, Validate)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1, message = "Sıfırlama kodu gerekli."))]
    token: String,
    #[validate(length(min = 6, message = "Şifre en az 6 karakter olmalı."))]
    password: String,
}

#[post("/password-reset/confirm", data = "<request>")]
pub async fn api_password_reset_confirm(
    request: Json<PasswordResetConfirm>,
    backend: &State<Backend>,
) -> ApiResult<Status> {
    let validated = request.validate_custom()?;
    complete_password_reset(backend, &validated.token, &validated.password)
        .await
        .validate_custom()?;
    Ok(Status::Ok)
}

#[get("/me")]
pub async fn api_me(caller: Caller) -> Json<MeResponse> {
    Json(MeResponse {
        user: caller.user,
        role: caller.role,
    })
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

/// Pushes every distinct value of a live observer until the client leaves
/// or the server shuts down.
fn observer_stream<T>(mut observer: Observer<T>, mut end: Shutdown) -> EventStream![Event + 'static]
where
    T: Serialize + PartialEq + Clone + Send + 'static,
{
    EventStream! {
        loop {
            let next = select! {
                next = observer.next() => next,
                _ = &mut end => break,
            };

            match next {
                Ok(Some(value)) => yield Event::json(&value),
                Ok(None) => break,
                Err(err) => {
                    err.log_and_record("Live stream");
                    yield Event::data(err.user_message()).event("error");
                    break;
                }
            }
        }
        observer.dispose();
    }
}

#[get("/me/role/stream")]
pub fn api_role_stream(
    user: AuthUser,
    backend: &State<Backend>,
    end: Shutdown,
) -> ApiResult<EventStream![Event + 'static]> {
    let observer = observe_role(backend.store(), &user.uid).validate_custom()?;
    Ok(observer_stream(observer, end))
}

#[put("/daily/<date>", data = "<updates>")]
pub async fn api_save_daily(
    date: &str,
    updates: Json<DayMap>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<SaveReport>> {
    caller
        .require_permission(Permission::RecordDailyStudies)
        .validate_custom()?;

    // An untouched form row is not a record.
    let updates: DayMap = updates
        .into_inner()
        .into_iter()
        .filter(|(_, entry)| !entry.is_all_zero())
        .collect();
    if updates.is_empty() {
        let date = to_iso(parse_iso_date(date).validate_custom()?);
        return Ok(Json(SaveReport {
            date,
            ..SaveReport::default()
        }));
    }

    let report = save_daily_studies(backend.store().as_ref(), Some(&caller.user), date, &updates)
        .await
        .validate_custom()?;
    Ok(Json(report))
}

#[get("/daily/<date>", rank = 2)]
pub async fn api_get_daily(date: &str, user: AuthUser, backend: &State<Backend>) -> ApiResult<Json<DayMap>> {
    let day = get_day(backend.store().as_ref(), &user.uid, date)
        .await
        .validate_custom()?;
    Ok(Json(day))
}

#[get("/daily/<date>/stream")]
pub fn api_daily_day_stream(
    date: &str,
    user: AuthUser,
    backend: &State<Backend>,
    end: Shutdown,
) -> ApiResult<EventStream![Event + 'static]> {
    let observer = observe_day(backend.store(), &user.uid, date).validate_custom()?;
    Ok(observer_stream(observer, end))
}

#[get("/daily")]
pub async fn api_get_all_daily(user: AuthUser, backend: &State<Backend>) -> ApiResult<Json<AllDays>> {
    let days = get_all_days(backend.store().as_ref(), &user.uid)
        .await
        .validate_custom()?;
    Ok(Json(days))
}

#[get("/daily/stream", rank = 1)]
pub fn api_daily_stream(
    user: AuthUser,
    backend: &State<Backend>,
    end: Shutdown,
) -> ApiResult<EventStream![Event + 'static]> {
    let observer = observe_all_days(backend.store(), &user.uid).validate_custom()?;
    Ok(observer_stream(observer, end))
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTotal {
    pub subject: Subject,
    pub questions: u32,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverviewResponse {
    pub week_start: String,
    pub week_label: String,
    pub totals: Totals,
    pub points: Vec<WeeklyPoint>,
    pub by_subject: Vec<SubjectTotal>,
    pub streak: u32,
    pub streak_level: StreakLevel,
}

fn resolve_week(week: Option<&str>) -> Result<String, AppError> {
    match week {
        Some(week) => monday_iso(week),
        None => Ok(to_iso(monday_of(today()))),
    }
}

fn build_overview(all_days: &AllDays, week: Option<&str>) -> Result<OverviewResponse, AppError> {
    let week_start = resolve_week(week)?;
    let start = parse_iso_date(&week_start)?;
    let streak = streak_days(all_days, today());

    Ok(OverviewResponse {
        week_label: week_label(&week_start)?,
        totals: week_totals(all_days, start),
        points: week_points(all_days, start),
        by_subject: Subject::ALL
            .into_iter()
            .map(|subject| SubjectTotal {
                subject,
                questions: subject_week_total(all_days, start, subject),
            })
            .collect(),
        streak,
        streak_level: StreakLevel::for_days(streak),
        week_start,
    })
}

#[get("/overview?<week>")]
pub async fn api_overview(
    week: Option<&str>,
    user: AuthUser,
    backend: &State<Backend>,
) -> ApiResult<Json<OverviewResponse>> {
    let all_days = get_all_days(backend.store().as_ref(), &user.uid)
        .await
        .validate_custom()?;
    Ok(Json(build_overview(&all_days, week).validate_custom()?))
}

#[get("/weeks")]
pub async fn api_weeks(user: AuthUser, backend: &State<Backend>) -> ApiResult<Json<Vec<WeekOption>>> {
    let all_days = get_all_days(backend.store().as_ref(), &user.uid)
        .await
        .validate_custom()?;
    Ok(Json(week_options(all_days.keys(), today(), WEEK_OPTION_LIMIT)))
}

async fn require_linked(store: &dyn DocumentStore, teacher_uid: &str, student_uid: &str) -> Result<(), AppError> {
    if is_linked(store, teacher_uid, student_uid).await? {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "Bu öğrenci listenizde değil.".to_string(),
        ))
    }
}

#[get("/students")]
pub async fn api_get_students(caller: Caller, backend: &State<Backend>) -> ApiResult<Json<Vec<UserPublic>>> {
    caller
        .require_permission(Permission::ViewStudents)
        .validate_custom()?;

    let students = list_students(backend.store().as_ref(), caller.uid())
        .await
        .validate_custom()?;
    Ok(Json(students))
}

#[get("/students/stream")]
pub fn api_students_stream(
    caller: Caller,
    backend: &State<Backend>,
    end: Shutdown,
) -> ApiResult<EventStream![Event + 'static]> {
    caller
        .require_permission(Permission::ViewStudents)
        .validate_custom()?;

    let observer = observe_student_uids(backend.store(), caller.uid()).validate_custom()?;
    Ok(observer_stream(observer, end))
}

#[derive(Deserialize, Validate)]
pub struct LinkRequest {
    #[validate(email(message = "Geçerli bir e-posta adresi girin."))]
    email: String,
}

#[derive(Serialize, Debug)]
pub struct LinkResponse {
    #[serde(flatten)]
    pub outcome: LinkOutcome,
    pub message: String,
}

#[post("/students", data = "<request>")]
pub async fn api_link_student(
    request: Json<LinkRequest>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<LinkResponse>> {
    caller
        .require_permission(Permission::LinkStudents)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let outcome = add_student_by_email(backend.store().as_ref(), caller.uid(), &validated.email)
        .await
        .validate_custom()?;

    Ok(Json(LinkResponse {
        message: outcome.message(),
        outcome,
    }))
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProgramView {
    pub week_start: String,
    pub program: Option<WeeklyProgramDoc>,
    pub tasks: WeekTasks,
    pub stats: ProgramStats,
    pub completion: Completion,
}

impl ProgramView {
    fn new(week_start: String, program: Option<WeeklyProgramDoc>) -> Self {
        let (stats, completion) = match &program {
            Some(doc) => (compute_stats(doc), completion(doc)),
            None => (ProgramStats::default(), Completion::default()),
        };

        Self {
            tasks: week_tasks_of(program.as_ref()),
            week_start,
            program,
            stats,
            completion,
        }
    }
}

#[get("/students/<student_uid>/program?<week>")]
pub async fn api_teacher_program(
    student_uid: &str,
    week: Option<&str>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<ProgramView>> {
    caller
        .require_permission(Permission::EditPrograms)
        .validate_custom()?;
    let store = backend.store();
    require_linked(store.as_ref(), caller.uid(), student_uid)
        .await
        .validate_custom()?;

    let week_start = resolve_week(week).validate_custom()?;
    let program = fetch_for_teacher(store.as_ref(), caller.uid(), student_uid, &week_start)
        .await
        .validate_custom()?;

    Ok(Json(ProgramView::new(week_start, program)))
}

#[put("/students/<student_uid>/program/<week>", data = "<tasks>")]
pub async fn api_save_program(
    student_uid: &str,
    week: &str,
    tasks: Json<WeekTasks>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<ProgramView>> {
    caller
        .require_permission(Permission::EditPrograms)
        .validate_custom()?;
    let store = backend.store();
    require_linked(store.as_ref(), caller.uid(), student_uid)
        .await
        .validate_custom()?;

    let doc = save_teacher_program(store.as_ref(), caller.uid(), student_uid, week, &tasks)
        .await
        .validate_custom()?;

    Ok(Json(ProgramView::new(week.to_string(), Some(doc))))
}

#[get("/students/<student_uid>/overview?<week>")]
pub async fn api_student_overview(
    student_uid: &str,
    week: Option<&str>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<OverviewResponse>> {
    caller
        .require_permission(Permission::ViewStudents)
        .validate_custom()?;
    let store = backend.store();
    require_linked(store.as_ref(), caller.uid(), student_uid)
        .await
        .validate_custom()?;

    let all_days = get_all_days(store.as_ref(), student_uid)
        .await
        .validate_custom()?;
    Ok(Json(build_overview(&all_days, week).validate_custom()?))
}

#[get("/students/<student_uid>/assignments")]
pub async fn api_student_assignments(
    student_uid: &str,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<Vec<Assignment>>> {
    caller
        .require_permission(Permission::CreateAssignments)
        .validate_custom()?;
    let store = backend.store();
    require_linked(store.as_ref(), caller.uid(), student_uid)
        .await
        .validate_custom()?;

    let items = list_for_student(store.as_ref(), student_uid)
        .await
        .validate_custom()?;
    Ok(Json(
        items
            .into_iter()
            .filter(|item| item.teacher_uid == caller.uid())
            .collect(),
    ))
}

#[post("/students/<student_uid>/assignments", data = "<input>")]
pub async fn api_create_assignment(
    student_uid: &str,
    input: Json<NewAssignment>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<(Status, Json<Assignment>)> {
    caller
        .require_permission(Permission::CreateAssignments)
        .validate_custom()?;
    let store = backend.store();
    require_linked(store.as_ref(), caller.uid(), student_uid)
        .await
        .validate_custom()?;

    let assignment = create_assignment(store.as_ref(), caller.uid(), student_uid, input.into_inner())
        .await
        .validate_custom()?;
    Ok((Status::Created, Json(assignment)))
}

#[get("/program?<week>")]
pub async fn api_student_program(
    week: Option<&str>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<ProgramView>> {
    caller
        .require_permission(Permission::ViewOwnProgram)
        .validate_custom()?;

    let week_start = resolve_week(week).validate_custom()?;
    let program = fetch_for_student(backend.store().as_ref(), caller.uid(), &week_start)
        .await
        .validate_custom()?;

    Ok(Json(ProgramView::new(week_start, program)))
}

/// Students send the day's task list back with flipped completion flags;
/// anything else about the tasks must stay as the teacher wrote it.
#[put("/program/<week>/<day>", data = "<tasks>")]
pub async fn api_patch_program_day(
    week: &str,
    day: &str,
    tasks: Json<Vec<Task>>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<ProgramView>> {
    caller
        .require_permission(Permission::MarkProgramTasks)
        .validate_custom()?;
    require_week_start(week).validate_custom()?;
    let day = DayKey::parse(day).validate_custom()?;
    let store = backend.store();

    let doc = fetch_for_student(store.as_ref(), caller.uid(), week)
        .await
        .validate_custom()?
        .ok_or_else(|| AppError::NotFound("Bu hafta için program yok.".to_string()))
        .validate_custom()?;

    if !only_completion_changed(doc.tasks(day), &tasks) {
        return Err(AppError::Authorization(
            "Sadece görevlerin tamamlanma durumu değiştirilebilir.".to_string(),
        )
        .to_validation_response());
    }

    let mut draft = ProgramDraft::load(week, Some(&doc));
    for (index, task) in tasks.iter().enumerate() {
        draft
            .toggle_done(day, index, task.done)
            .map_err(AppError::from)
            .validate_custom()?;
    }

    commit_student_draft(store.as_ref(), &mut draft, &doc.teacher_uid, caller.uid())
        .await
        .validate_custom()?;

    let program = fetch_for_student(store.as_ref(), caller.uid(), week)
        .await
        .validate_custom()?;
    Ok(Json(ProgramView::new(week.to_string(), program)))
}

#[get("/coaches")]
pub async fn api_get_coaches(caller: Caller, backend: &State<Backend>) -> ApiResult<Json<Vec<UserPublic>>> {
    let coaches = list_coaches(backend.store().as_ref(), caller.uid())
        .await
        .validate_custom()?;
    Ok(Json(coaches))
}

#[get("/assignments?<filter>&<q>")]
pub async fn api_get_assignments(
    filter: Option<&str>,
    q: Option<&str>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Json<Vec<Assignment>>> {
    caller
        .require_permission(Permission::ViewOwnAssignments)
        .validate_custom()?;
    let filter = AssignmentFilter::parse(filter.unwrap_or_default()).validate_custom()?;

    let items = list_for_student(backend.store().as_ref(), caller.uid())
        .await
        .validate_custom()?;

    Ok(Json(
        filter_assignments(&items, filter, q.unwrap_or_default(), Utc::now())
            .into_iter()
            .cloned()
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    status: AssignmentStatus,
}

#[put("/assignments/<id>/status", data = "<update>")]
pub async fn api_set_assignment_status(
    id: &str,
    update: Json<StatusUpdate>,
    caller: Caller,
    backend: &State<Backend>,
) -> ApiResult<Status> {
    caller
        .require_permission(Permission::UpdateAssignmentStatus)
        .validate_custom()?;

    set_status(backend.store().as_ref(), caller.uid(), id, update.status)
        .await
        .validate_custom()?;
    Ok(Status::Ok)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
