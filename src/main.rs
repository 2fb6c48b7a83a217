#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use aes_gcm::aead::{rand_core::RngCore, Aead, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use pbkdf2::pbkdf2_hmac;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point, Polygon, Rgb,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tauri::{AppHandle, Manager};
use tauri_plugin_clipboard_manager::ClipboardExt;
use tauri_plugin_opener::OpenerExt;

const AUTH_FILE: &str = "auth.json";
const DATA_FILE: &str = "planer-cbt.enc";
const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;
const DB_VERSION: u8 = 1;

const DAY_NAMES: [&str; 7] = [
    "Poniedziałek",
    "Wtorek",
    "Środa",
    "Czwartek",
    "Piątek",
    "Sobota",
    "Niedziela",
];
const DAY_PERIODS: [&str; 3] = ["rano", "poludnie", "wieczor"];
const DAY_PERIOD_LABELS: [&str; 3] = ["Rano", "Poludnie", "Wieczor"];
const MONTH_NAMES: [&str; 12] = [
    "stycznia",
    "lutego",
    "marca",
    "kwietnia",
    "maja",
    "czerwca",
    "lipca",
    "sierpnia",
    "września",
    "października",
    "listopada",
    "grudnia",
];
const FOCUS_CHAOS: &str = "chaos";
const FOCUS_CALM: &str = "spokój";
const FOCUS_HYPER: &str = "hiperfokus";
const DAY_CATEGORIES: [&str; 4] = ["przyjemność", "obowiązek", "relacje", "dbanie o siebie"];
const DAY_STATUSES: [&str; 3] = ["tak", "częściowo", "nie"];
const WEEKLY_SCORE_FIELDS: [&str; 4] = ["mood_start", "energy_start", "mood_end", "energy_end"];
const WEEKLY_SUMMARY_FIELDS: [&str; 4] = [
    "most_helpful",
    "hardest",
    "positive_influence",
    "next_week_goal",
];
const SCORE_MAX: i64 = 10;

const PAGE_W: f64 = 297.0;
const PAGE_H: f64 = 210.0;
const PAGE_TOP: f64 = 15.0;
const PAGE_BOTTOM: f64 = 196.0;
const MARGIN_LEFT: f64 = 14.0;
const CELL_PAD: f64 = 2.0;
const PT_TO_MM: f64 = 0.352_778;

const BLACK: (u8, u8, u8) = (0, 0, 0);
const WHITE: (u8, u8, u8) = (255, 255, 255);
const HEADER_INDIGO: (u8, u8, u8) = (79, 70, 229);
const HEADER_PINK: (u8, u8, u8) = (236, 72, 153);
const FOCUS_AMBER: (u8, u8, u8) = (251, 191, 36);
const FOCUS_PURPLE: (u8, u8, u8) = (147, 51, 234);
// #36cb94 at 30% alpha, pre-blended on white.
const FOCUS_GREEN_TINT: (u8, u8, u8) = (195, 239, 223);
const FOCUS_GREEN_TEXT: (u8, u8, u8) = (4, 55, 36);
const PLEASANT_GREEN: (u8, u8, u8) = (22, 163, 74);
const UNPLEASANT_RED: (u8, u8, u8) = (220, 38, 38);
const STRIPE_GRAY: (u8, u8, u8) = (245, 245, 245);
const GRID_GRAY: (u8, u8, u8) = (180, 180, 180);

#[derive(Default)]
struct DbCacheState {
    key: Option<String>,
    value: Option<serde_json::Value>,
    db_salt: Option<Vec<u8>>,
    db_key: Option<[u8; 32]>,
}

#[derive(Serialize)]
struct StorageInfoResult {
    ok: bool,
    path_label: String,
}

#[derive(Serialize)]
struct PickBackupResult {
    ok: bool,
    canceled: bool,
    name: Option<String>,
    data: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct SaveFileResult {
    ok: bool,
    canceled: bool,
    filename: String,
    path: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ClipboardWriteRequest {
    text: String,
}

#[derive(Deserialize)]
struct OpenExternalRequest {
    url: String,
}

#[derive(Deserialize)]
struct WeekInfoRequest {
    date: Option<String>,
    week_key: Option<String>,
}

#[derive(Deserialize)]
struct DbAuthRequest {
    password: String,
}

#[derive(Deserialize)]
struct DbDayRequest {
    password: String,
    date: String,
}

#[derive(Deserialize)]
struct DbActivityAddRequest {
    password: String,
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct DbActivityUpdateRequest {
    password: String,
    id: String,
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct DbActivityDeleteRequest {
    password: String,
    id: String,
}

#[derive(Deserialize)]
struct DbWeeklyRequest {
    password: String,
    week_key: String,
}

#[derive(Deserialize)]
struct DbWeeklyScoresRequest {
    password: String,
    week_key: String,
    scores: serde_json::Value,
}

#[derive(Deserialize)]
struct DbWeeklySummariesRequest {
    password: String,
    week_key: String,
    summaries: serde_json::Value,
}

#[derive(Deserialize)]
struct DbWeeklyDayRequest {
    password: String,
    week_key: String,
    day: String,
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct DbNotesGetRequest {
    password: String,
    read_only: Option<bool>,
}

#[derive(Deserialize)]
struct DbNoteAddRequest {
    password: String,
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct DbNoteDeleteRequest {
    password: String,
    id: String,
}

#[derive(Deserialize)]
struct BackupImportRequest {
    action: String,
    file_name: Option<String>,
    file_data: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
struct CryptoEnvelope {
    v: u8,
    salt: String,
    iv: String,
    tag: String,
    data: String,
}

#[derive(Serialize, Deserialize)]
struct AuthRecord {
    salt: String,
    hash: String,
    #[serde(default = "default_pbkdf2_iterations")]
    iterations: u32,
}

#[derive(Deserialize)]
struct AuthSetupRequest {
    password: String,
    iterations: Option<u32>,
}

#[derive(Deserialize)]
struct AuthVerifyRequest {
    password: String,
}

#[derive(Deserialize)]
struct AuthChangeRequest {
    current: String,
    next: String,
    iterations: Option<u32>,
}

#[tauri::command]
fn app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
fn platform_name() -> String {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        "android" => "android",
        _ => "linux",
    }
    .to_string()
}

#[tauri::command]
fn storage_info(app: AppHandle) -> Result<StorageInfoResult, String> {
    let root = storage_root_dir(&app)?;
    Ok(StorageInfoResult {
        ok: true,
        path_label: root.to_string_lossy().to_string(),
    })
}

#[tauri::command]
fn clipboard_write(app: AppHandle, payload: ClipboardWriteRequest) -> Result<bool, String> {
    app.clipboard()
        .write_text(payload.text)
        .map_err(|err| err.to_string())?;
    Ok(true)
}

#[tauri::command]
fn open_external(app: AppHandle, payload: OpenExternalRequest) -> Result<bool, String> {
    app.opener()
        .open_url(payload.url, Option::<String>::None)
        .map_err(|err: tauri_plugin_opener::Error| err.to_string())?;
    Ok(true)
}

#[tauri::command]
fn week_info(payload: WeekInfoRequest) -> Result<serde_json::Value, String> {
    let week_key = if let Some(key) = payload
        .week_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
    {
        parse_week_key(key)?;
        key.to_string()
    } else if let Some(date_text) = payload
        .date
        .as_deref()
        .map(str::trim)
        .filter(|date| !date.is_empty())
    {
        let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d")
            .map_err(|_| format!("Invalid date: {date_text}"))?;
        week_key_for_date(date)
    } else {
        week_key_for_date(Local::now().date_naive())
    };

    let mut days = Vec::new();
    for (index, name) in DAY_NAMES.iter().enumerate() {
        let date = date_from_week_key(week_key.as_str(), index)?;
        days.push(json!({
            "name": name,
            "date": date.format("%Y-%m-%d").to_string(),
            "display": format_date_pl(date),
            "label": day_label(week_key.as_str(), index)?,
        }));
    }

    Ok(json!({
        "week_key": week_key,
        "range": full_week_range(week_key.as_str())?,
        "prev": adjacent_week_key(week_key.as_str(), "prev")?,
        "next": adjacent_week_key(week_key.as_str(), "next")?,
        "days": days,
    }))
}

#[tauri::command]
fn auth_read(app: AppHandle) -> Result<Option<AuthRecord>, String> {
    read_auth_record(&app)
}

#[tauri::command]
fn auth_setup(app: AppHandle, payload: AuthSetupRequest) -> Result<AuthRecord, String> {
    let password = payload.password;
    if password.is_empty() {
        return Err("Password is required.".to_string());
    }
    if read_auth_record(&app)?.is_some() {
        return Err("Password is already configured.".to_string());
    }
    let iterations = payload
        .iterations
        .unwrap_or(DEFAULT_PBKDF2_ITERATIONS)
        .max(1);
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(password.as_str(), &salt, iterations);
    let record = AuthRecord {
        salt: encode_b64(&salt),
        hash: encode_b64(key.as_slice()),
        iterations,
    };
    write_auth_record(&app, &record)?;
    Ok(record)
}

#[tauri::command]
fn auth_verify(app: AppHandle, payload: AuthVerifyRequest) -> Result<bool, String> {
    verify_auth_password(&app, payload.password.as_str())
}

#[tauri::command]
fn auth_change(app: AppHandle, payload: AuthChangeRequest) -> Result<bool, String> {
    let Some(current_record) = read_auth_record(&app)? else {
        return Ok(false);
    };
    if payload.current.is_empty() || payload.next.is_empty() {
        return Ok(false);
    }
    let salt = match decode_b64(current_record.salt.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(false),
    };
    let current_key = derive_key(
        payload.current.as_str(),
        salt.as_slice(),
        current_record.iterations.max(1),
    );
    if encode_b64(current_key.as_slice()) != current_record.hash {
        return Ok(false);
    }

    // The store is keyed by the same password, so it re-encrypts in the same step.
    let db = load_db_value(&app, payload.current.as_str())?;

    let iterations = payload
        .iterations
        .unwrap_or(current_record.iterations)
        .max(1);
    let mut new_salt = [0u8; 16];
    OsRng.fill_bytes(&mut new_salt);
    let new_key = derive_key(payload.next.as_str(), &new_salt, iterations);
    let next_record = AuthRecord {
        salt: encode_b64(&new_salt),
        hash: encode_b64(new_key.as_slice()),
        iterations,
    };
    write_auth_record(&app, &next_record)?;
    clear_db_cache();
    save_db_value(&app, payload.next.as_str(), &db)?;
    Ok(true)
}

#[tauri::command]
fn db_activities_get(app: AppHandle, payload: DbDayRequest) -> Result<serde_json::Value, String> {
    let db = load_db_value(&app, payload.password.as_str())?;
    let date = clamp_string(payload.date.as_str(), 10, true);
    if date.is_empty() {
        return Err("Missing date.".to_string());
    }
    Ok(json!(activities_for_date(&db, date.as_str())))
}

#[tauri::command]
fn db_activities_add(
    app: AppHandle,
    payload: DbActivityAddRequest,
) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let entry_payload = payload.payload;
    let date = clamp_string(value_ref_string(entry_payload.get("date")).as_str(), 10, true);
    if NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d").is_err() {
        return Ok(json!({ "ok": false, "error": "Invalid date. Use YYYY-MM-DD." }));
    }
    let Some(hour) = parse_clock_time(value_ref_string(entry_payload.get("hour")).as_str()) else {
        return Ok(json!({ "ok": false, "error": "Invalid hour. Use HH:MM." }));
    };

    let entry = build_activity_entry(&entry_payload, date.as_str(), hour.as_str());
    db_rows_mut(&mut db, "activities")?.push(entry.clone());
    save_db_value(&app, payload.password.as_str(), &db)?;
    Ok(json!({ "ok": true, "entry": entry }))
}

#[tauri::command]
fn db_activities_update(
    app: AppHandle,
    payload: DbActivityUpdateRequest,
) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let entry_id = clamp_string(payload.id.as_str(), 128, true);
    if entry_id.is_empty() {
        return Ok(json!({ "ok": false, "error": "Missing entry id." }));
    }
    let update_payload = payload.payload;
    if has_key(&update_payload, "hour")
        && parse_clock_time(value_ref_string(update_payload.get("hour")).as_str()).is_none()
    {
        return Ok(json!({ "ok": false, "error": "Invalid hour. Use HH:MM." }));
    }
    if has_key(&update_payload, "date")
        && NaiveDate::parse_from_str(
            clamp_string(value_ref_string(update_payload.get("date")).as_str(), 10, true).as_str(),
            "%Y-%m-%d",
        )
        .is_err()
    {
        return Ok(json!({ "ok": false, "error": "Invalid date. Use YYYY-MM-DD." }));
    }

    let mut updated: Option<serde_json::Value> = None;
    {
        let rows = db_rows_mut(&mut db, "activities")?;
        if let Some(entry) = rows
            .iter_mut()
            .find(|entry| value_ref_string(entry.get("id")) == entry_id)
        {
            if let Some(entry_obj) = entry.as_object_mut() {
                apply_activity_updates(entry_obj, &update_payload);
                entry_obj.insert("updated_at".to_string(), json!(now_string()));
                updated = Some(serde_json::Value::Object(entry_obj.clone()));
            }
        }
    }
    let Some(updated) = updated else {
        return Ok(json!({ "ok": false, "error": "Entry not found." }));
    };
    save_db_value(&app, payload.password.as_str(), &db)?;
    Ok(json!({ "ok": true, "entry": updated }))
}

#[tauri::command]
fn db_activities_delete(
    app: AppHandle,
    payload: DbActivityDeleteRequest,
) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let entry_id = clamp_string(payload.id.as_str(), 128, true);
    if entry_id.is_empty() {
        return Ok(json!({ "ok": true }));
    }
    let removed = {
        let rows = db_rows_mut(&mut db, "activities")?;
        let before = rows.len();
        rows.retain(|entry| value_ref_string(entry.get("id")) != entry_id);
        rows.len() != before
    };
    if removed {
        save_db_value(&app, payload.password.as_str(), &db)?;
    }
    Ok(json!({ "ok": true }))
}

#[tauri::command]
fn db_day_summary(app: AppHandle, payload: DbDayRequest) -> Result<serde_json::Value, String> {
    let db = load_db_value(&app, payload.password.as_str())?;
    let date = clamp_string(payload.date.as_str(), 10, true);
    if date.is_empty() {
        return Err("Missing date.".to_string());
    }
    let entries = activities_for_date(&db, date.as_str());
    Ok(day_summary_value(entries.as_slice()))
}

#[tauri::command]
fn db_weekly_get(app: AppHandle, payload: DbWeeklyRequest) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let week_key = clamp_string(payload.week_key.as_str(), 40, true);
    parse_week_key(week_key.as_str())?;

    let (out, changed) = {
        let (entry, changed) = weekly_entry_mut(&mut db, week_key.as_str())?;
        (entry.clone(), changed)
    };
    if changed {
        save_db_value(&app, payload.password.as_str(), &db)?;
    }
    Ok(out)
}

#[tauri::command]
fn db_weekly_set_scores(
    app: AppHandle,
    payload: DbWeeklyScoresRequest,
) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let week_key = clamp_string(payload.week_key.as_str(), 40, true);
    parse_week_key(week_key.as_str())?;

    let out = {
        let (entry, _) = weekly_entry_mut(&mut db, week_key.as_str())?;
        if let Some(entry_obj) = entry.as_object_mut() {
            for field in WEEKLY_SCORE_FIELDS {
                if has_key(&payload.scores, field) {
                    entry_obj
                        .insert(field.to_string(), json!(clamp_score(payload.scores.get(field))));
                }
            }
        }
        entry.clone()
    };
    save_db_value(&app, payload.password.as_str(), &db)?;
    Ok(json!({ "ok": true, "week": out }))
}

#[tauri::command]
fn db_weekly_set_summaries(
    app: AppHandle,
    payload: DbWeeklySummariesRequest,
) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let week_key = clamp_string(payload.week_key.as_str(), 40, true);
    parse_week_key(week_key.as_str())?;

    let out = {
        let (entry, _) = weekly_entry_mut(&mut db, week_key.as_str())?;
        if let Some(summaries) = entry
            .get_mut("summaries")
            .and_then(|value| value.as_object_mut())
        {
            for field in WEEKLY_SUMMARY_FIELDS {
                if has_key(&payload.summaries, field) {
                    let text = clamp_text(
                        value_ref_string(payload.summaries.get(field)).as_str(),
                        2000,
                    );
                    summaries.insert(field.to_string(), json!(text));
                }
            }
        }
        entry.clone()
    };
    save_db_value(&app, payload.password.as_str(), &db)?;
    Ok(json!({ "ok": true, "week": out }))
}

#[tauri::command]
fn db_weekly_set_day(
    app: AppHandle,
    payload: DbWeeklyDayRequest,
) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let week_key = clamp_string(payload.week_key.as_str(), 40, true);
    parse_week_key(week_key.as_str())?;
    let day = clamp_string(payload.day.as_str(), 40, true);
    if !DAY_NAMES.contains(&day.as_str()) {
        return Ok(json!({ "ok": false, "error": "Invalid day name." }));
    }

    let plan = sanitize_day_plan(&payload.payload);
    {
        let (entry, _) = weekly_entry_mut(&mut db, week_key.as_str())?;
        if let Some(days) = entry.get_mut("days").and_then(|value| value.as_object_mut()) {
            days.insert(day.clone(), plan.clone());
        }
    }
    save_db_value(&app, payload.password.as_str(), &db)?;
    Ok(json!({ "ok": true, "day": day, "plan": plan }))
}

#[tauri::command]
fn db_weekly_trend(app: AppHandle, payload: DbWeeklyRequest) -> Result<serde_json::Value, String> {
    let db = load_db_value(&app, payload.password.as_str())?;
    let week_key = clamp_string(payload.week_key.as_str(), 40, true);
    parse_week_key(week_key.as_str())?;

    let mut entry = db
        .get("weekly")
        .and_then(|value| value.get(week_key.as_str()))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let week_start = format_date_pl(date_from_week_key(week_key.as_str(), 0)?);
    let week_end = format_date_pl(date_from_week_key(week_key.as_str(), 6)?);
    ensure_weekly_shape(
        &mut entry,
        week_key.as_str(),
        week_start.as_str(),
        week_end.as_str(),
    );
    Ok(weekly_trend_value(&entry))
}

#[tauri::command]
fn db_notes_get(app: AppHandle, payload: DbNotesGetRequest) -> Result<serde_json::Value, String> {
    // Notes are private to the owner; the shared read-only view never receives them.
    if payload.read_only.unwrap_or(false) {
        return Ok(json!([]));
    }
    let db = load_db_value(&app, payload.password.as_str())?;
    Ok(json!(sorted_notes(&db)))
}

#[tauri::command]
fn db_notes_add(app: AppHandle, payload: DbNoteAddRequest) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let title = clamp_string(payload.title.as_str(), 100, true);
    let content = clamp_text(payload.content.as_str(), 20_000);
    if title.is_empty() || content.is_empty() {
        return Ok(json!({ "ok": false, "error": "Title and content are required." }));
    }
    let note = build_note_value(title.as_str(), content.as_str());
    db_rows_mut(&mut db, "notes")?.push(note.clone());
    save_db_value(&app, payload.password.as_str(), &db)?;
    Ok(json!({ "ok": true, "note": note }))
}

#[tauri::command]
fn db_notes_delete(
    app: AppHandle,
    payload: DbNoteDeleteRequest,
) -> Result<serde_json::Value, String> {
    let mut db = load_db_value(&app, payload.password.as_str())?;
    let note_id = clamp_string(payload.id.as_str(), 128, true);
    if note_id.is_empty() {
        return Ok(json!({ "ok": true }));
    }
    let removed = {
        let rows = db_rows_mut(&mut db, "notes")?;
        let before = rows.len();
        rows.retain(|note| value_ref_string(note.get("id")) != note_id);
        rows.len() != before
    };
    if removed {
        save_db_value(&app, payload.password.as_str(), &db)?;
    }
    Ok(json!({ "ok": true }))
}

#[tauri::command]
fn export_daily_pdf(app: AppHandle, payload: DbDayRequest) -> Result<SaveFileResult, String> {
    if !verify_auth_password(&app, payload.password.as_str())? {
        return Ok(export_error("Invalid password."));
    }
    let date = clamp_string(payload.date.as_str(), 10, true);
    if date.is_empty() {
        return Err("Missing date.".to_string());
    }
    let db = load_db_value(&app, payload.password.as_str())?;
    let entries = activities_for_date(&db, date.as_str());
    let bytes = build_daily_report(entries.as_slice(), date.as_str())?;
    save_binary_file(format!("plan-cbt-{date}.pdf"), ".pdf", bytes)
}

#[tauri::command]
fn export_weekly_pdf(app: AppHandle, payload: DbWeeklyRequest) -> Result<SaveFileResult, String> {
    if !verify_auth_password(&app, payload.password.as_str())? {
        return Ok(export_error("Invalid password."));
    }
    let week_key = clamp_string(payload.week_key.as_str(), 40, true);
    parse_week_key(week_key.as_str())?;
    let db = load_db_value(&app, payload.password.as_str())?;

    let mut entry = db
        .get("weekly")
        .and_then(|value| value.get(week_key.as_str()))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let week_start = format_date_pl(date_from_week_key(week_key.as_str(), 0)?);
    let week_end = format_date_pl(date_from_week_key(week_key.as_str(), 6)?);
    ensure_weekly_shape(
        &mut entry,
        week_key.as_str(),
        week_start.as_str(),
        week_end.as_str(),
    );
    let bytes = build_weekly_report(&entry, week_key.as_str())?;
    save_binary_file(format!("plan-tygodniowy-{week_key}.pdf"), ".pdf", bytes)
}

#[tauri::command]
fn pick_backup_file() -> Result<PickBackupResult, String> {
    let path = rfd::FileDialog::new()
        .add_filter("Planer CBT Backup", &["enc", "json"])
        .pick_file();

    let Some(path) = path else {
        return Ok(PickBackupResult {
            ok: false,
            canceled: true,
            name: None,
            data: None,
            error: None,
        });
    };

    let data = fs::read_to_string(&path).map_err(|err| err.to_string())?;
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .or_else(|| Some("planer-cbt-import.enc".to_string()));

    Ok(PickBackupResult {
        ok: true,
        canceled: false,
        name,
        data: Some(data),
        error: None,
    })
}

#[tauri::command]
fn backup_export(app: AppHandle, payload: DbAuthRequest) -> Result<SaveFileResult, String> {
    if !verify_auth_password(&app, payload.password.as_str())? {
        return Ok(export_error("Invalid password."));
    }
    let db = load_db_value(&app, payload.password.as_str())?;
    let normalized = ensure_db_shape_value(db);
    let plaintext = serde_json::to_string(&normalized).map_err(|err| err.to_string())?;
    let envelope = encrypt_text(plaintext.as_str(), payload.password.as_str())?;
    let content = serde_json::to_string_pretty(&envelope).map_err(|err| err.to_string())?;
    save_text_file_dialog("planer-cbt-backup.enc".to_string(), ".enc", content)
}

#[tauri::command]
fn backup_import(
    app: AppHandle,
    payload: BackupImportRequest,
) -> Result<serde_json::Value, String> {
    let action = clamp_string(payload.action.as_str(), 20, true).to_lowercase();
    if action != "replace" && action != "merge" {
        return Ok(json!({
            "ok": false,
            "code": "broken",
            "error": "Invalid import action.",
        }));
    }

    let password = clamp_string(payload.password.as_str(), 256, false);
    if !verify_auth_password(&app, password.as_str())? {
        return Ok(json!({
            "ok": false,
            "code": "password",
            "error": "Invalid password.",
        }));
    }

    let encrypted_json: serde_json::Value = match serde_json::from_str(payload.file_data.as_str()) {
        Ok(value) => value,
        Err(_) => {
            return Ok(json!({
                "ok": false,
                "code": "broken",
                "error": "Import file is not valid JSON.",
            }));
        }
    };
    let encrypted: CryptoEnvelope = match serde_json::from_value(encrypted_json) {
        Ok(value) => value,
        Err(_) => {
            return Ok(json!({
                "ok": false,
                "code": "broken",
                "error": "Unable to decrypt the import file.",
            }));
        }
    };
    let decrypted = match decrypt_envelope(&encrypted, password.as_str())? {
        Some(value) => value,
        None => {
            return Ok(json!({
                "ok": false,
                "code": "broken",
                "error": "Unable to decrypt the import file.",
            }));
        }
    };
    let imported_json: serde_json::Value = match serde_json::from_str(decrypted.as_str()) {
        Ok(value) => value,
        Err(_) => {
            return Ok(json!({
                "ok": false,
                "code": "broken",
                "error": "Unable to decrypt the import file.",
            }));
        }
    };
    let migrated = ensure_db_shape_value(imported_json);
    if let Some((code, message)) = validate_store_basic(&migrated) {
        return Ok(json!({
            "ok": false,
            "code": code,
            "error": message,
        }));
    }

    if action == "merge" {
        let mut db = load_db_value(&app, password.as_str())?;
        merge_store(&mut db, &migrated);
        save_db_value(&app, password.as_str(), &db)?;
    } else {
        save_db_value(&app, password.as_str(), &migrated)?;
    }

    let _ = payload.file_name;
    Ok(json!({ "ok": true, "action": action }))
}

fn week_key_for_date(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

fn parse_week_key(value: &str) -> Result<(i32, u32), String> {
    let trimmed = value.trim();
    let Some((year_text, week_text)) = trimmed.split_once("-W") else {
        return Err(format!("Invalid week key: {trimmed}"));
    };
    let year = year_text
        .parse::<i32>()
        .map_err(|_| format!("Invalid week key: {trimmed}"))?;
    let week = week_text
        .parse::<u32>()
        .map_err(|_| format!("Invalid week key: {trimmed}"))?;
    if week == 0 || NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_none() {
        return Err(format!("Invalid week key: {trimmed}"));
    }
    Ok((year, week))
}

fn date_from_week_key(value: &str, day_index: usize) -> Result<NaiveDate, String> {
    if day_index > 6 {
        return Err("Day index out of range.".to_string());
    }
    let (year, week) = parse_week_key(value)?;
    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
        .ok_or_else(|| format!("Invalid week key: {value}"))?;
    Ok(monday + Duration::days(day_index as i64))
}

fn format_date_pl(date: NaiveDate) -> String {
    format!("{:02}.{:02}.{}", date.day(), date.month(), date.year())
}

fn full_week_range(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        return Ok(String::new());
    }
    let start = date_from_week_key(value, 0)?;
    let end = date_from_week_key(value, 6)?;
    Ok(format!("{} - {}", format_date_pl(start), format_date_pl(end)))
}

fn adjacent_week_key(value: &str, direction: &str) -> Result<String, String> {
    let monday = date_from_week_key(value, 0)?;
    let offset = if direction == "next" { 7 } else { -7 };
    Ok(week_key_for_date(monday + Duration::days(offset)))
}

fn day_label(value: &str, day_index: usize) -> Result<String, String> {
    let date = date_from_week_key(value, day_index)?;
    let month = MONTH_NAMES[(date.month() - 1) as usize];
    Ok(format!(
        "{}, {:02} {} {}",
        DAY_NAMES[day_index],
        date.day(),
        month,
        date.year()
    ))
}

fn is_full_entry(entry: &serde_json::Value) -> bool {
    !value_ref_string(entry.get("activity")).trim().is_empty()
}

fn activities_for_date(db: &serde_json::Value, date: &str) -> Vec<serde_json::Value> {
    let mut out: Vec<serde_json::Value> = db
        .get("activities")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|entry| value_ref_string(entry.get("date")) == date)
        .collect();
    out.sort_by(|a, b| value_ref_string(a.get("hour")).cmp(&value_ref_string(b.get("hour"))));
    out
}

fn normalize_focus_state(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed == FOCUS_CHAOS || trimmed == FOCUS_HYPER {
        trimmed.to_string()
    } else {
        FOCUS_CALM.to_string()
    }
}

fn normalize_is_pleasant(value: &str) -> String {
    if value.trim().eq_ignore_ascii_case("nie") {
        "Nie".to_string()
    } else {
        "Tak".to_string()
    }
}

fn parse_clock_time(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let (hour_text, minute_text) = trimmed.split_once(':')?;
    if hour_text.is_empty() || minute_text.is_empty() {
        return None;
    }
    let hours = hour_text.parse::<i64>().ok()?;
    let minutes = minute_text.parse::<i64>().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    Some(format!("{hours:02}:{minutes:02}"))
}

fn clamp_score(value: Option<&serde_json::Value>) -> i64 {
    value_i64(value).clamp(0, SCORE_MAX)
}

fn build_activity_entry(payload: &serde_json::Value, date: &str, hour: &str) -> serde_json::Value {
    let now = now_string();
    json!({
        "id": new_id(),
        "date": date,
        "hour": hour,
        "activity": clamp_text(value_ref_string(payload.get("activity")).as_str(), 2000),
        "context": clamp_string(value_ref_string(payload.get("context")).as_str(), 200, true),
        "pleasure": clamp_score(payload.get("pleasure")),
        "mastery": clamp_score(payload.get("mastery")),
        "emotion": clamp_string(value_ref_string(payload.get("emotion")).as_str(), 120, true),
        "emotion_intensity": clamp_score(payload.get("emotion_intensity")),
        "is_pleasant": normalize_is_pleasant(value_ref_string(payload.get("is_pleasant")).as_str()),
        "focus_state": normalize_focus_state(value_ref_string(payload.get("focus_state")).as_str()),
        "notes": clamp_text(value_ref_string(payload.get("notes")).as_str(), 2000),
        "created_at": now.clone(),
        "updated_at": now,
    })
}

fn apply_activity_updates(
    entry: &mut serde_json::Map<String, serde_json::Value>,
    payload: &serde_json::Value,
) {
    if has_key(payload, "date") {
        entry.insert(
            "date".to_string(),
            json!(clamp_string(value_ref_string(payload.get("date")).as_str(), 10, true)),
        );
    }
    if has_key(payload, "hour") {
        if let Some(hour) = parse_clock_time(value_ref_string(payload.get("hour")).as_str()) {
            entry.insert("hour".to_string(), json!(hour));
        }
    }
    if has_key(payload, "activity") {
        entry.insert(
            "activity".to_string(),
            json!(clamp_text(value_ref_string(payload.get("activity")).as_str(), 2000)),
        );
    }
    if has_key(payload, "context") {
        entry.insert(
            "context".to_string(),
            json!(clamp_string(value_ref_string(payload.get("context")).as_str(), 200, true)),
        );
    }
    if has_key(payload, "pleasure") {
        entry.insert(
            "pleasure".to_string(),
            json!(clamp_score(payload.get("pleasure"))),
        );
    }
    if has_key(payload, "mastery") {
        entry.insert(
            "mastery".to_string(),
            json!(clamp_score(payload.get("mastery"))),
        );
    }
    if has_key(payload, "emotion") {
        entry.insert(
            "emotion".to_string(),
            json!(clamp_string(value_ref_string(payload.get("emotion")).as_str(), 120, true)),
        );
    }
    if has_key(payload, "emotion_intensity") {
        entry.insert(
            "emotion_intensity".to_string(),
            json!(clamp_score(payload.get("emotion_intensity"))),
        );
    }
    if has_key(payload, "is_pleasant") {
        entry.insert(
            "is_pleasant".to_string(),
            json!(normalize_is_pleasant(
                value_ref_string(payload.get("is_pleasant")).as_str()
            )),
        );
    }
    if has_key(payload, "focus_state") {
        entry.insert(
            "focus_state".to_string(),
            json!(normalize_focus_state(
                value_ref_string(payload.get("focus_state")).as_str()
            )),
        );
    }
    if has_key(payload, "notes") {
        entry.insert(
            "notes".to_string(),
            json!(clamp_text(value_ref_string(payload.get("notes")).as_str(), 2000)),
        );
    }
}

fn day_summary_value(entries: &[serde_json::Value]) -> serde_json::Value {
    let full: Vec<&serde_json::Value> =
        entries.iter().filter(|entry| is_full_entry(entry)).collect();
    let focus_count = entries.len() - full.len();
    let top_mastery = full
        .iter()
        .max_by_key(|entry| value_i64(entry.get("mastery")))
        .map(|entry| (*entry).clone())
        .unwrap_or(serde_json::Value::Null);
    let top_pleasure = full
        .iter()
        .max_by_key(|entry| value_i64(entry.get("pleasure")))
        .map(|entry| (*entry).clone())
        .unwrap_or(serde_json::Value::Null);
    json!({
        "full_count": full.len(),
        "focus_count": focus_count,
        "top_mastery": top_mastery,
        "top_pleasure": top_pleasure,
    })
}

fn default_day_plan() -> serde_json::Value {
    sanitize_day_plan(&json!({}))
}

fn sanitize_day_plan(payload: &serde_json::Value) -> serde_json::Value {
    let category = clamp_string(value_ref_string(payload.get("category")).as_str(), 40, true);
    let category = if DAY_CATEGORIES.contains(&category.as_str()) {
        category
    } else {
        String::new()
    };
    let status = clamp_string(value_ref_string(payload.get("status")).as_str(), 20, true);
    let status = if DAY_STATUSES.contains(&status.as_str()) {
        status
    } else {
        String::new()
    };

    let mut tracker = serde_json::Map::new();
    for period in DAY_PERIODS {
        let source = payload.get("mood_tracker").and_then(|value| value.get(period));
        tracker.insert(
            period.to_string(),
            json!({
                "mood": clamp_score(source.and_then(|value| value.get("mood"))),
                "energy": clamp_score(source.and_then(|value| value.get("energy"))),
                "note": clamp_string(
                    value_ref_string(source.and_then(|value| value.get("note"))).as_str(),
                    200,
                    false,
                ),
            }),
        );
    }

    json!({
        "activity": clamp_string(value_ref_string(payload.get("activity")).as_str(), 200, false),
        "category": category,
        "status": status,
        "mood_after": clamp_score(payload.get("mood_after")),
        "energy_after": clamp_score(payload.get("energy_after")),
        "mood_tracker": tracker,
    })
}

fn ensure_weekly_shape(
    entry: &mut serde_json::Value,
    week_key: &str,
    week_start: &str,
    week_end: &str,
) -> bool {
    let mut changed = false;
    if !entry.is_object() {
        *entry = json!({});
        changed = true;
    }
    let Some(entry_obj) = entry.as_object_mut() else {
        return changed;
    };

    for (key, value) in [
        ("week_key", week_key),
        ("week_start", week_start),
        ("week_end", week_end),
    ] {
        if !entry_obj.get(key).is_some_and(|v| v.is_string()) {
            entry_obj.insert(key.to_string(), json!(value));
            changed = true;
        }
    }
    for key in WEEKLY_SCORE_FIELDS {
        if !entry_obj.get(key).is_some_and(|v| v.is_number()) {
            entry_obj.insert(key.to_string(), json!(0));
            changed = true;
        }
    }
    if !entry_obj.get("summaries").is_some_and(|v| v.is_object()) {
        entry_obj.insert("summaries".to_string(), json!({}));
        changed = true;
    }
    if let Some(summaries) = entry_obj
        .get_mut("summaries")
        .and_then(|value| value.as_object_mut())
    {
        for key in WEEKLY_SUMMARY_FIELDS {
            if !summaries.get(key).is_some_and(|v| v.is_string()) {
                summaries.insert(key.to_string(), json!(""));
                changed = true;
            }
        }
    }
    if !entry_obj.get("days").is_some_and(|v| v.is_object()) {
        entry_obj.insert("days".to_string(), json!({}));
        changed = true;
    }
    if let Some(days) = entry_obj
        .get_mut("days")
        .and_then(|value| value.as_object_mut())
    {
        for day in DAY_NAMES {
            if !days.get(day).is_some_and(|v| v.is_object()) {
                days.insert(day.to_string(), default_day_plan());
                changed = true;
                continue;
            }
            if let Some(plan) = days.get_mut(day).and_then(|value| value.as_object_mut()) {
                for key in ["activity", "category", "status"] {
                    if !plan.get(key).is_some_and(|v| v.is_string()) {
                        plan.insert(key.to_string(), json!(""));
                        changed = true;
                    }
                }
                for key in ["mood_after", "energy_after"] {
                    if !plan.get(key).is_some_and(|v| v.is_number()) {
                        plan.insert(key.to_string(), json!(0));
                        changed = true;
                    }
                }
                if !plan.get("mood_tracker").is_some_and(|v| v.is_object()) {
                    plan.insert("mood_tracker".to_string(), json!({}));
                    changed = true;
                }
                if let Some(tracker) = plan
                    .get_mut("mood_tracker")
                    .and_then(|value| value.as_object_mut())
                {
                    for period in DAY_PERIODS {
                        if !tracker.get(period).is_some_and(|v| v.is_object()) {
                            tracker.insert(
                                period.to_string(),
                                json!({ "mood": 0, "energy": 0, "note": "" }),
                            );
                            changed = true;
                            continue;
                        }
                        if let Some(slot) = tracker
                            .get_mut(period)
                            .and_then(|value| value.as_object_mut())
                        {
                            for key in ["mood", "energy"] {
                                if !slot.get(key).is_some_and(|v| v.is_number()) {
                                    slot.insert(key.to_string(), json!(0));
                                    changed = true;
                                }
                            }
                            if !slot.get("note").is_some_and(|v| v.is_string()) {
                                slot.insert("note".to_string(), json!(""));
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
    }
    changed
}

fn weekly_entry_mut<'a>(
    db: &'a mut serde_json::Value,
    week_key: &str,
) -> Result<(&'a mut serde_json::Value, bool), String> {
    let week_start = format_date_pl(date_from_week_key(week_key, 0)?);
    let week_end = format_date_pl(date_from_week_key(week_key, 6)?);

    let mut changed = false;
    if !db.get("weekly").is_some_and(|v| v.is_object()) {
        db["weekly"] = json!({});
        changed = true;
    }
    let weekly = db
        .get_mut("weekly")
        .and_then(|value| value.as_object_mut())
        .ok_or_else(|| "Invalid weekly store.".to_string())?;
    let entry = weekly.entry(week_key.to_string()).or_insert_with(|| {
        changed = true;
        json!({})
    });
    changed |= ensure_weekly_shape(entry, week_key, week_start.as_str(), week_end.as_str());
    Ok((entry, changed))
}

fn tracker_average(day: &serde_json::Value, field: &str) -> f64 {
    let tracker = day.get("mood_tracker");
    let mut total = 0_i64;
    for period in DAY_PERIODS {
        total += value_i64(
            tracker
                .and_then(|value| value.get(period))
                .and_then(|value| value.get(field)),
        );
    }
    // Divided by three periods regardless of how many are filled, per the sheet.
    ((total as f64 / 3.0) * 10.0).round() / 10.0
}

fn weekly_trend_value(entry: &serde_json::Value) -> serde_json::Value {
    let mut points = Vec::new();
    for day in DAY_NAMES {
        let plan = entry
            .get("days")
            .and_then(|value| value.get(day))
            .cloned()
            .unwrap_or_else(|| json!({}));
        points.push(json!({
            "name": day,
            "mood": tracker_average(&plan, "mood"),
            "energy": tracker_average(&plan, "energy"),
        }));
    }
    json!(points)
}

fn sorted_notes(db: &serde_json::Value) -> Vec<serde_json::Value> {
    let mut notes: Vec<serde_json::Value> = db
        .get("notes")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default();
    notes.sort_by_key(|note| std::cmp::Reverse(value_i64(note.get("created_at"))));
    notes
}

fn build_note_value(title: &str, content: &str) -> serde_json::Value {
    json!({
        "id": new_id(),
        "title": title,
        "content": content,
        "created_at": now_string(),
        "date_string": format_date_pl(Local::now().date_naive()),
    })
}

fn fold_polish_accents(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            'ą' => 'a',
            'ć' => 'c',
            'ę' => 'e',
            'ł' => 'l',
            'ń' => 'n',
            'ó' => 'o',
            'ś' => 's',
            'ź' => 'z',
            'ż' => 'z',
            'Ą' => 'A',
            'Ć' => 'C',
            'Ę' => 'E',
            'Ł' => 'L',
            'Ń' => 'N',
            'Ó' => 'O',
            'Ś' => 'S',
            'Ź' => 'Z',
            'Ż' => 'Z',
            other => other,
        })
        .collect()
}

fn color_rgb(color: (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        color.0 as f32 / 255.0,
        color.1 as f32 / 255.0,
        color.2 as f32 / 255.0,
        None,
    ))
}

fn approx_text_width(text: &str, font_size: f64) -> f64 {
    text.chars().count() as f64 * font_size * PT_TO_MM * 0.5
}

fn truncate_to_width(value: &str, width: f64, font_size: f64) -> String {
    let flat = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let approx_char = font_size * PT_TO_MM * 0.5;
    if approx_char <= 0.0 {
        return flat;
    }
    let max_chars = (width / approx_char).floor() as usize;
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

struct TableColumn {
    title: &'static str,
    width: f64,
}

struct TableTheme {
    header_fill: (u8, u8, u8),
    font_size: f64,
    striped: bool,
    grid: bool,
}

struct CellStyle {
    fill: Option<(u8, u8, u8)>,
    text_color: Option<(u8, u8, u8)>,
    bold: bool,
}

impl CellStyle {
    fn plain() -> Self {
        CellStyle {
            fill: None,
            text_color: None,
            bold: false,
        }
    }
}

struct ReportDoc {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    font_bold: IndirectFontRef,
    cursor_y: f64,
}

impl ReportDoc {
    fn new(title: &str) -> Result<Self, String> {
        let (doc, page, layer) = PdfDocument::new(title, Mm((PAGE_W) as f32), Mm((PAGE_H) as f32), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| err.to_string())?;
        let font_bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|err| err.to_string())?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(ReportDoc {
            doc,
            layer,
            font,
            font_bold,
            cursor_y: PAGE_TOP,
        })
    }

    fn add_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm((PAGE_W) as f32), Mm((PAGE_H) as f32), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor_y = PAGE_TOP;
    }

    fn ensure_space(&mut self, height: f64) {
        if self.cursor_y + height > PAGE_BOTTOM {
            self.add_page();
        }
    }

    // Built-in Helvetica carries no Polish glyphs, so every string is folded to ASCII.
    fn text(
        &self,
        text: &str,
        font_size: f64,
        x: f64,
        baseline_y: f64,
        color: (u8, u8, u8),
        bold: bool,
    ) {
        self.layer.set_fill_color(color_rgb(color));
        let font = if bold { &self.font_bold } else { &self.font };
        self.layer.use_text(
            fold_polish_accents(text),
            font_size as f32,
            Mm((x) as f32),
            Mm((PAGE_H - baseline_y) as f32),
            font,
        );
    }

    fn text_centered(
        &self,
        text: &str,
        font_size: f64,
        center_x: f64,
        baseline_y: f64,
        color: (u8, u8, u8),
        bold: bool,
    ) {
        let width = approx_text_width(text, font_size);
        self.text(text, font_size, center_x - width / 2.0, baseline_y, color, bold);
    }

    fn rect(
        &self,
        x: f64,
        top_y: f64,
        width: f64,
        height: f64,
        color: (u8, u8, u8),
        mode: PaintMode,
    ) {
        match mode {
            PaintMode::Stroke => {
                self.layer.set_outline_color(color_rgb(color));
                self.layer.set_outline_thickness(0.2);
            }
            _ => self.layer.set_fill_color(color_rgb(color)),
        }
        let top = PAGE_H - top_y;
        let bottom = PAGE_H - (top_y + height);
        let polygon = Polygon {
            rings: vec![vec![
                (Point::new(Mm((x) as f32), Mm((top) as f32)), false),
                (Point::new(Mm((x + width) as f32), Mm((top) as f32)), false),
                (Point::new(Mm((x + width) as f32), Mm((bottom) as f32)), false),
                (Point::new(Mm((x) as f32), Mm((bottom) as f32)), false),
            ]],
            mode,
            winding_order: WindingOrder::NonZero,
        };
        self.layer.add_polygon(polygon);
    }

    fn save(self) -> Result<Vec<u8>, String> {
        self.doc.save_to_bytes().map_err(|err| err.to_string())
    }
}

fn table_row_height(font_size: f64) -> f64 {
    font_size * PT_TO_MM + 2.0 * CELL_PAD
}

fn render_table_header(report: &mut ReportDoc, columns: &[TableColumn], theme: &TableTheme) {
    let row_h = table_row_height(theme.font_size);
    let total: f64 = columns.iter().map(|column| column.width).sum();
    report.rect(
        MARGIN_LEFT,
        report.cursor_y,
        total,
        row_h,
        theme.header_fill,
        PaintMode::Fill,
    );
    let mut x = MARGIN_LEFT;
    for column in columns {
        report.text(
            column.title,
            theme.font_size,
            x + CELL_PAD,
            report.cursor_y + row_h - CELL_PAD,
            WHITE,
            true,
        );
        x += column.width;
    }
    report.cursor_y += row_h;
}

fn render_table(
    report: &mut ReportDoc,
    columns: &[TableColumn],
    rows: &[Vec<String>],
    theme: &TableTheme,
    style_cell: &dyn Fn(usize, usize, &str) -> CellStyle,
) {
    let row_h = table_row_height(theme.font_size);
    let total: f64 = columns.iter().map(|column| column.width).sum();
    report.ensure_space(row_h * 2.0);
    render_table_header(report, columns, theme);

    for (row_index, row) in rows.iter().enumerate() {
        // Rows that would cross the bottom margin restart under a fresh header.
        if report.cursor_y + row_h > PAGE_BOTTOM {
            report.add_page();
            render_table_header(report, columns, theme);
        }
        if theme.striped && row_index % 2 == 1 {
            report.rect(
                MARGIN_LEFT,
                report.cursor_y,
                total,
                row_h,
                STRIPE_GRAY,
                PaintMode::Fill,
            );
        }
        let mut x = MARGIN_LEFT;
        for (col_index, column) in columns.iter().enumerate() {
            let raw = row.get(col_index).map(String::as_str).unwrap_or("");
            let style = style_cell(row_index, col_index, raw);
            if let Some(fill) = style.fill {
                report.rect(x, report.cursor_y, column.width, row_h, fill, PaintMode::Fill);
            }
            if theme.grid {
                report.rect(
                    x,
                    report.cursor_y,
                    column.width,
                    row_h,
                    GRID_GRAY,
                    PaintMode::Stroke,
                );
            }
            let text = truncate_to_width(raw, column.width - 2.0 * CELL_PAD, theme.font_size);
            report.text(
                text.as_str(),
                theme.font_size,
                x + CELL_PAD,
                report.cursor_y + row_h - CELL_PAD,
                style.text_color.unwrap_or(BLACK),
                style.bold,
            );
            x += column.width;
        }
        report.cursor_y += row_h;
    }
}

fn focus_swatch(state: &str) -> ((u8, u8, u8), &'static str, (u8, u8, u8)) {
    match state {
        FOCUS_CHAOS => (FOCUS_AMBER, "CH", WHITE),
        FOCUS_HYPER => (FOCUS_PURPLE, "F", WHITE),
        _ => (FOCUS_GREEN_TINT, "OK", FOCUS_GREEN_TEXT),
    }
}

fn score_cell(entry: &serde_json::Value, key: &str) -> String {
    value_i64(entry.get(key)).to_string()
}

const DAILY_COLUMNS: [TableColumn; 10] = [
    TableColumn { title: "Godzina", width: 16.0 },
    TableColumn { title: "Aktywnosc", width: 50.0 },
    TableColumn { title: "Kontekst", width: 34.0 },
    TableColumn { title: "Przyj.", width: 13.0 },
    TableColumn { title: "Skut.", width: 13.0 },
    TableColumn { title: "Emocje", width: 32.0 },
    TableColumn { title: "Sila", width: 11.0 },
    TableColumn { title: "Przyj.?", width: 15.0 },
    TableColumn { title: "Skupienie", width: 22.0 },
    TableColumn { title: "Uwagi", width: 40.0 },
];

fn build_daily_report(entries: &[serde_json::Value], date: &str) -> Result<Vec<u8>, String> {
    let mut report = ReportDoc::new("Dzienny plan aktywnosci - nurt CBT")?;
    report.text(
        "Dzienny plan aktywnosci - nurt CBT",
        16.0,
        MARGIN_LEFT,
        15.0,
        BLACK,
        false,
    );
    report.text(
        format!("Data: {date}").as_str(),
        11.0,
        MARGIN_LEFT,
        22.0,
        BLACK,
        false,
    );
    report.cursor_y = 30.0;

    // The table lists full entries only; focus-only entries appear on the map below.
    let mut rows: Vec<Vec<String>> = entries
        .iter()
        .filter(|entry| is_full_entry(entry))
        .map(|entry| {
            vec![
                value_ref_string(entry.get("hour")),
                value_ref_string(entry.get("activity")),
                value_ref_string(entry.get("context")),
                score_cell(entry, "pleasure"),
                score_cell(entry, "mastery"),
                value_ref_string(entry.get("emotion")),
                score_cell(entry, "emotion_intensity"),
                value_ref_string(entry.get("is_pleasant")),
                value_ref_string(entry.get("focus_state")),
                value_ref_string(entry.get("notes")),
            ]
        })
        .collect();
    if rows.is_empty() {
        let mut placeholder = vec!["-".to_string(); DAILY_COLUMNS.len()];
        placeholder[1] = "Brak pelnych wpisow".to_string();
        rows.push(placeholder);
    }

    let theme = TableTheme {
        header_fill: HEADER_INDIGO,
        font_size: 8.0,
        striped: false,
        grid: false,
    };
    render_table(
        &mut report,
        &DAILY_COLUMNS,
        rows.as_slice(),
        &theme,
        &|_, col, value| {
            let mut style = CellStyle::plain();
            if col == 7 {
                if value == "Tak" {
                    style.text_color = Some(PLEASANT_GREEN);
                    style.bold = true;
                } else if value == "Nie" {
                    style.text_color = Some(UNPLEASANT_RED);
                }
            }
            if col == 8 {
                if value == FOCUS_CHAOS {
                    style.text_color = Some(FOCUS_AMBER);
                    style.bold = true;
                } else if value == FOCUS_HYPER {
                    style.text_color = Some(FOCUS_PURPLE);
                    style.bold = true;
                } else if value != "-" {
                    style.fill = Some(FOCUS_GREEN_TINT);
                    style.text_color = Some(FOCUS_GREEN_TEXT);
                    style.bold = true;
                }
            }
            style
        },
    );

    report.cursor_y += 15.0;
    report.ensure_space(30.0);
    report.text(
        "Mapa skupienia w ciagu dnia (wszystkie wpisy):",
        12.0,
        MARGIN_LEFT,
        report.cursor_y,
        BLACK,
        false,
    );

    let mut x = MARGIN_LEFT;
    for entry in entries {
        if x > 270.0 {
            x = MARGIN_LEFT;
            report.cursor_y += 15.0;
            report.ensure_space(15.0);
        }
        report.text(
            value_ref_string(entry.get("hour")).as_str(),
            8.0,
            x,
            report.cursor_y + 5.0,
            BLACK,
            false,
        );
        let state = value_ref_string(entry.get("focus_state"));
        let (fill, letter, text_color) = focus_swatch(state.as_str());
        report.rect(x, report.cursor_y + 7.0, 10.0, 5.0, fill, PaintMode::Fill);
        report.text_centered(letter, 7.0, x + 5.0, report.cursor_y + 10.5, text_color, true);
        x += 14.0;
    }

    report.cursor_y += 18.0;
    report.ensure_space(10.0);
    let legend_y = report.cursor_y;
    report.rect(14.0, legend_y, 5.0, 5.0, FOCUS_AMBER, PaintMode::Fill);
    report.text_centered("CH", 6.0, 16.5, legend_y + 3.5, WHITE, true);
    report.text("Chaos", 8.0, 21.0, legend_y + 3.5, BLACK, false);
    report.rect(36.0, legend_y, 5.0, 5.0, FOCUS_GREEN_TINT, PaintMode::Fill);
    report.text_centered("OK", 5.0, 38.5, legend_y + 3.5, FOCUS_GREEN_TEXT, true);
    report.text("balans", 8.0, 43.0, legend_y + 3.5, BLACK, false);
    report.rect(60.0, legend_y, 5.0, 5.0, FOCUS_PURPLE, PaintMode::Fill);
    report.text_centered("F", 6.0, 62.5, legend_y + 3.5, WHITE, true);
    report.text("Hiperfokus", 8.0, 67.0, legend_y + 3.5, BLACK, false);

    report.save()
}

const WEEKLY_MAIN_COLUMNS: [TableColumn; 6] = [
    TableColumn { title: "Dzien", width: 30.0 },
    TableColumn { title: "Aktywnosc", width: 90.0 },
    TableColumn { title: "Kategoria", width: 40.0 },
    TableColumn { title: "Wykonano", width: 30.0 },
    TableColumn { title: "Nastroj po", width: 25.0 },
    TableColumn { title: "Energia po", width: 25.0 },
];

const WEEKLY_MOOD_COLUMNS: [TableColumn; 5] = [
    TableColumn { title: "Dzien", width: 30.0 },
    TableColumn { title: "Pora", width: 25.0 },
    TableColumn { title: "Nastroj", width: 22.0 },
    TableColumn { title: "Energia", width: 22.0 },
    TableColumn { title: "Notatka", width: 120.0 },
];

// Unfilled scores stay at zero and print as a dash.
fn score_or_dash(value: Option<&serde_json::Value>) -> String {
    let score = value_i64(value);
    if score == 0 {
        "-".to_string()
    } else {
        score.to_string()
    }
}

fn build_weekly_report(entry: &serde_json::Value, week_key: &str) -> Result<Vec<u8>, String> {
    let range = full_week_range(week_key)?;
    let mut report = ReportDoc::new("Tygodniowy plan aktywizacji")?;
    report.text(
        format!("Tygodniowy plan aktywizacji: {range}").as_str(),
        16.0,
        MARGIN_LEFT,
        15.0,
        BLACK,
        false,
    );
    report.cursor_y = 25.0;

    let days = entry.get("days");
    let main_rows: Vec<Vec<String>> = DAY_NAMES
        .iter()
        .map(|day| {
            let plan = days.and_then(|value| value.get(*day));
            vec![
                (*day).to_string(),
                value_ref_string(plan.and_then(|value| value.get("activity"))),
                value_ref_string(plan.and_then(|value| value.get("category"))),
                value_ref_string(plan.and_then(|value| value.get("status"))),
                score_or_dash(plan.and_then(|value| value.get("mood_after"))),
                score_or_dash(plan.and_then(|value| value.get("energy_after"))),
            ]
        })
        .collect();
    let main_theme = TableTheme {
        header_fill: HEADER_INDIGO,
        font_size: 8.0,
        striped: false,
        grid: true,
    };
    render_table(
        &mut report,
        &WEEKLY_MAIN_COLUMNS,
        main_rows.as_slice(),
        &main_theme,
        &|_, _, _| CellStyle::plain(),
    );

    report.add_page();
    report.text(
        "Monitoring Dobowy Nastroju",
        14.0,
        MARGIN_LEFT,
        15.0,
        BLACK,
        false,
    );
    report.cursor_y = 25.0;

    let mut mood_rows: Vec<Vec<String>> = Vec::new();
    for day in DAY_NAMES {
        let tracker = days
            .and_then(|value| value.get(day))
            .and_then(|value| value.get("mood_tracker"));
        for (index, period) in DAY_PERIODS.iter().enumerate() {
            let slot = tracker.and_then(|value| value.get(*period));
            mood_rows.push(vec![
                if index == 0 { day.to_string() } else { String::new() },
                DAY_PERIOD_LABELS[index].to_string(),
                score_or_dash(slot.and_then(|value| value.get("mood"))),
                score_or_dash(slot.and_then(|value| value.get("energy"))),
                value_ref_string(slot.and_then(|value| value.get("note"))),
            ]);
        }
    }
    let mood_theme = TableTheme {
        header_fill: HEADER_PINK,
        font_size: 7.0,
        striped: true,
        grid: false,
    };
    render_table(
        &mut report,
        &WEEKLY_MOOD_COLUMNS,
        mood_rows.as_slice(),
        &mood_theme,
        &|_, _, _| CellStyle::plain(),
    );

    report.cursor_y += 10.0;
    report.ensure_space(25.0);
    report.text(
        "Podsumowanie Tygodnia (CBT)",
        12.0,
        MARGIN_LEFT,
        report.cursor_y,
        BLACK,
        false,
    );
    let summaries = entry.get("summaries");
    report.text(
        format!(
            "Co pomoglo: {}",
            value_ref_string(summaries.and_then(|value| value.get("most_helpful")))
        )
        .as_str(),
        9.0,
        MARGIN_LEFT,
        report.cursor_y + 7.0,
        BLACK,
        false,
    );
    report.text(
        format!(
            "Najtrudniejsze: {}",
            value_ref_string(summaries.and_then(|value| value.get("hardest")))
        )
        .as_str(),
        9.0,
        MARGIN_LEFT,
        report.cursor_y + 14.0,
        BLACK,
        false,
    );

    report.save()
}

fn export_error(message: &str) -> SaveFileResult {
    SaveFileResult {
        ok: false,
        canceled: false,
        filename: String::new(),
        path: None,
        error: Some(message.to_string()),
    }
}

fn save_binary_file(
    filename: String,
    extension: &str,
    bytes: Vec<u8>,
) -> Result<SaveFileResult, String> {
    let default_name = sanitize_export_filename(filename.as_str(), extension);
    let path = rfd::FileDialog::new()
        .set_file_name(default_name.as_str())
        .save_file();

    let Some(path) = path else {
        return Ok(SaveFileResult {
            ok: false,
            canceled: true,
            filename: default_name,
            path: None,
            error: None,
        });
    };

    write_binary_file(path.clone(), bytes.as_slice())?;
    Ok(SaveFileResult {
        ok: true,
        canceled: false,
        filename: default_name,
        path: Some(path.to_string_lossy().to_string()),
        error: None,
    })
}

fn save_text_file_dialog(
    filename: String,
    extension: &str,
    content: String,
) -> Result<SaveFileResult, String> {
    let default_name = sanitize_export_filename(filename.as_str(), extension);
    let path = rfd::FileDialog::new()
        .set_file_name(default_name.as_str())
        .save_file();

    let Some(path) = path else {
        return Ok(SaveFileResult {
            ok: false,
            canceled: true,
            filename: default_name,
            path: None,
            error: None,
        });
    };

    write_text_file(path.clone(), content.as_str())?;
    Ok(SaveFileResult {
        ok: true,
        canceled: false,
        filename: default_name,
        path: Some(path.to_string_lossy().to_string()),
        error: None,
    })
}

fn now_string() -> String {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    ms.to_string()
}

fn new_id() -> String {
    let mut bytes = [0_u8; 10];
    OsRng.fill_bytes(&mut bytes);
    let mut hex = String::new();
    for b in bytes {
        hex.push_str(format!("{:02x}", b).as_str());
    }
    format!("id-{}-{hex}", now_string())
}

fn value_ref_string(value: Option<&serde_json::Value>) -> String {
    nonempty_string(value).unwrap_or_default()
}

fn nonempty_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(text)) => Some(text.clone()),
        Some(serde_json::Value::Number(number)) => Some(number.to_string()),
        Some(serde_json::Value::Bool(boolean)) => Some(boolean.to_string()),
        _ => None,
    }
}

fn value_i64(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(v) => {
            if let Some(num) = v.as_i64() {
                num
            } else if let Some(num) = v.as_u64() {
                num as i64
            } else if let Some(num) = v.as_f64() {
                num.round() as i64
            } else if let Some(text) = v.as_str() {
                text.trim().parse::<i64>().unwrap_or(0)
            } else {
                0
            }
        }
        None => 0,
    }
}

fn has_key(value: &serde_json::Value, key: &str) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key(key))
        .unwrap_or(false)
}

fn clamp_string(value: &str, max_len: usize, trim: bool) -> String {
    let mut out = if trim {
        value.trim().to_string()
    } else {
        value.to_string()
    };
    out = out
        .chars()
        .filter(|ch| {
            let code = *ch as u32;
            code >= 32 && code != 127
        })
        .collect();
    if out.chars().count() > max_len {
        out = out.chars().take(max_len).collect();
    }
    out
}

// Multiline variant: journal text keeps newlines and tabs.
fn clamp_text(value: &str, max_len: usize) -> String {
    let mut out: String = value
        .trim()
        .chars()
        .filter(|ch| {
            let code = *ch as u32;
            *ch == '\n' || *ch == '\t' || (code >= 32 && code != 127)
        })
        .collect();
    if out.chars().count() > max_len {
        out = out.chars().take(max_len).collect();
    }
    out
}

fn db_rows_mut<'a>(
    db: &'a mut serde_json::Value,
    key: &str,
) -> Result<&'a mut Vec<serde_json::Value>, String> {
    db.get_mut(key)
        .and_then(|value| value.as_array_mut())
        .ok_or_else(|| format!("Invalid {key} store."))
}

fn merge_rows_by_id(target: &mut Vec<serde_json::Value>, incoming: &[serde_json::Value]) {
    let mut index: HashMap<String, usize> = HashMap::new();
    for (position, row) in target.iter().enumerate() {
        let id = value_ref_string(row.get("id"));
        if !id.is_empty() {
            index.insert(id, position);
        }
    }
    for row in incoming {
        let id = value_ref_string(row.get("id"));
        if id.is_empty() {
            continue;
        }
        match index.get(id.as_str()) {
            Some(position) => target[*position] = row.clone(),
            None => {
                index.insert(id, target.len());
                target.push(row.clone());
            }
        }
    }
}

fn merge_store(target: &mut serde_json::Value, incoming: &serde_json::Value) {
    for collection in ["activities", "notes"] {
        let incoming_rows = incoming
            .get(collection)
            .and_then(|value| value.as_array())
            .cloned()
            .unwrap_or_default();
        if let Ok(target_rows) = db_rows_mut(target, collection) {
            merge_rows_by_id(target_rows, incoming_rows.as_slice());
        }
    }
    let incoming_weeks = incoming
        .get("weekly")
        .and_then(|value| value.as_object())
        .cloned()
        .unwrap_or_default();
    if let Some(weekly) = target
        .get_mut("weekly")
        .and_then(|value| value.as_object_mut())
    {
        for (key, value) in incoming_weeks {
            weekly.insert(key, value);
        }
    }
}

fn validate_store_basic(db: &serde_json::Value) -> Option<(String, String)> {
    let Some(db_obj) = db.as_object() else {
        return Some((
            "broken".to_string(),
            "Backup payload is not an object.".to_string(),
        ));
    };

    let version = value_i64(db_obj.get("version"));
    if version > DB_VERSION as i64 {
        return Some((
            "broken".to_string(),
            "Backup version is newer than this app supports.".to_string(),
        ));
    }

    if !db_obj.get("activities").is_some_and(|v| v.is_array()) {
        return Some(("broken".to_string(), "Activity data is invalid.".to_string()));
    }
    if !db_obj.get("weekly").is_some_and(|v| v.is_object()) {
        return Some(("broken".to_string(), "Weekly data is invalid.".to_string()));
    }
    if !db_obj.get("notes").is_some_and(|v| v.is_array()) {
        return Some(("broken".to_string(), "Note data is invalid.".to_string()));
    }

    for entry in db_obj
        .get("activities")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
    {
        if value_ref_string(entry.get("id")).is_empty() {
            return Some(("broken".to_string(), "Activity IDs are invalid.".to_string()));
        }
        if value_ref_string(entry.get("date")).is_empty() {
            return Some((
                "broken".to_string(),
                "Activity dates are missing.".to_string(),
            ));
        }
    }
    for note in db_obj
        .get("notes")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
    {
        if value_ref_string(note.get("id")).is_empty() {
            return Some(("broken".to_string(), "Note IDs are invalid.".to_string()));
        }
    }
    None
}

fn verify_auth_password(app: &AppHandle, password: &str) -> Result<bool, String> {
    let Some(record) = read_auth_record(app)? else {
        return Ok(false);
    };
    if password.is_empty() {
        return Ok(false);
    }
    let salt = match decode_b64(record.salt.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(false),
    };
    let key = derive_key(password, salt.as_slice(), record.iterations.max(1));
    Ok(encode_b64(key.as_slice()) == record.hash)
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

fn auth_file_path(app: &AppHandle) -> Result<PathBuf, String> {
    let root = storage_root_dir(app)?;
    Ok(root.join(AUTH_FILE))
}

fn read_auth_record(app: &AppHandle) -> Result<Option<AuthRecord>, String> {
    let path = auth_file_path(app)?;
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let mut record: AuthRecord = match serde_json::from_str(raw.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    if record.salt.is_empty() || record.hash.is_empty() {
        return Ok(None);
    }
    if record.iterations == 0 {
        record.iterations = DEFAULT_PBKDF2_ITERATIONS;
    }
    Ok(Some(record))
}

fn write_auth_record(app: &AppHandle, payload: &AuthRecord) -> Result<(), String> {
    let path = auth_file_path(app)?;
    let content = serde_json::to_string_pretty(payload).map_err(|err| err.to_string())?;
    write_text_file(path, content.as_str())
}

fn encrypt_text_with_key(
    text: &str,
    salt: &[u8],
    key: &[u8; 32],
) -> Result<CryptoEnvelope, String> {
    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|err| err.to_string())?;
    let nonce = Nonce::from_slice(&iv);
    let encrypted = cipher
        .encrypt(nonce, text.as_bytes())
        .map_err(|err| err.to_string())?;

    if encrypted.len() < 16 {
        return Err("Encryption output too short.".to_string());
    }
    let split_at = encrypted.len() - 16;
    let (data, tag) = encrypted.split_at(split_at);

    Ok(CryptoEnvelope {
        v: 1,
        salt: encode_b64(salt),
        iv: encode_b64(&iv),
        tag: encode_b64(tag),
        data: encode_b64(data),
    })
}

fn encrypt_text(text: &str, password: &str) -> Result<CryptoEnvelope, String> {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(password, &salt, DEFAULT_PBKDF2_ITERATIONS);
    encrypt_text_with_key(text, &salt, &key)
}

fn decrypt_envelope_with_key(
    payload: &CryptoEnvelope,
    key: &[u8; 32],
) -> Result<Option<String>, String> {
    let iv = match decode_b64(payload.iv.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    let tag = match decode_b64(payload.tag.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    let data = match decode_b64(payload.data.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    if iv.len() != 12 || tag.is_empty() || data.is_empty() {
        return Ok(None);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|err| err.to_string())?;
    let nonce = Nonce::from_slice(iv.as_slice());
    let mut combined = Vec::with_capacity(data.len() + tag.len());
    combined.extend_from_slice(data.as_slice());
    combined.extend_from_slice(tag.as_slice());

    let decrypted = match cipher.decrypt(nonce, combined.as_slice()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };

    match String::from_utf8(decrypted) {
        Ok(text) => Ok(Some(text)),
        Err(_) => Ok(None),
    }
}

fn decrypt_envelope(payload: &CryptoEnvelope, password: &str) -> Result<Option<String>, String> {
    let salt = match decode_b64(payload.salt.as_str()) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    let key = derive_key(password, salt.as_slice(), DEFAULT_PBKDF2_ITERATIONS);
    decrypt_envelope_with_key(payload, &key)
}

fn db_cache() -> &'static Mutex<DbCacheState> {
    static CACHE: OnceLock<Mutex<DbCacheState>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(DbCacheState::default()))
}

fn db_cache_key(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    encode_b64(digest.as_ref())
}

fn clear_db_cache() {
    if let Ok(mut guard) = db_cache().lock() {
        *guard = DbCacheState::default();
    }
}

fn load_cached_db_value(password: &str) -> Option<serde_json::Value> {
    let cache_key = db_cache_key(password);
    let guard = db_cache().lock().ok()?;
    if guard.key.as_deref() == Some(cache_key.as_str()) {
        return guard.value.clone();
    }
    None
}

fn store_cached_db_value(password: &str, value: &serde_json::Value) {
    if let Ok(mut guard) = db_cache().lock() {
        let cache_key = db_cache_key(password);
        if guard.key.as_deref() != Some(cache_key.as_str()) {
            guard.db_salt = None;
            guard.db_key = None;
        }
        guard.key = Some(cache_key);
        guard.value = Some(value.clone());
    }
}

fn load_cached_db_crypto(password: &str) -> Option<(Vec<u8>, [u8; 32])> {
    let cache_key = db_cache_key(password);
    let guard = db_cache().lock().ok()?;
    if guard.key.as_deref() != Some(cache_key.as_str()) {
        return None;
    }
    let salt = guard.db_salt.clone()?;
    let key = guard.db_key?;
    Some((salt, key))
}

fn store_cached_db_crypto(password: &str, salt: &[u8], key: [u8; 32]) {
    if let Ok(mut guard) = db_cache().lock() {
        let cache_key = db_cache_key(password);
        if guard.key.as_deref() != Some(cache_key.as_str()) {
            guard.value = None;
        }
        guard.key = Some(cache_key);
        guard.db_salt = Some(salt.to_vec());
        guard.db_key = Some(key);
    }
}

fn db_file_path(app: &AppHandle) -> Result<PathBuf, String> {
    let root = storage_root_dir(app)?;
    Ok(root.join(DATA_FILE))
}

fn load_db_value(app: &AppHandle, password: &str) -> Result<serde_json::Value, String> {
    if let Some(cached) = load_cached_db_value(password) {
        return Ok(cached);
    }
    let path = db_file_path(app)?;
    if !path.exists() {
        let out = default_db_value();
        store_cached_db_value(password, &out);
        return Ok(out);
    }
    let raw = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let envelope: CryptoEnvelope = match serde_json::from_str(raw.as_str()) {
        Ok(value) => value,
        Err(_) => {
            let out = default_db_value();
            store_cached_db_value(password, &out);
            return Ok(out);
        }
    };
    let salt = match decode_b64(envelope.salt.as_str()) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            let out = default_db_value();
            store_cached_db_value(password, &out);
            return Ok(out);
        }
    };
    let key = match load_cached_db_crypto(password) {
        Some((cached_salt, cached_key)) if cached_salt == salt => cached_key,
        _ => derive_key(password, salt.as_slice(), DEFAULT_PBKDF2_ITERATIONS),
    };
    let decrypted = match decrypt_envelope_with_key(&envelope, &key)? {
        Some(text) => text,
        None => {
            let out = default_db_value();
            store_cached_db_value(password, &out);
            return Ok(out);
        }
    };
    let parsed: serde_json::Value = match serde_json::from_str(decrypted.as_str()) {
        Ok(value) => value,
        Err(_) => {
            let out = default_db_value();
            store_cached_db_value(password, &out);
            return Ok(out);
        }
    };
    let out = ensure_db_shape_value(parsed);
    store_cached_db_value(password, &out);
    store_cached_db_crypto(password, salt.as_slice(), key);
    Ok(out)
}

fn save_db_value(app: &AppHandle, password: &str, value: &serde_json::Value) -> Result<(), String> {
    let path = db_file_path(app)?;
    let normalized = ensure_db_shape_value(value.clone());
    let plaintext = serde_json::to_string(&normalized).map_err(|err| err.to_string())?;
    let (salt, key) = if let Some((salt, key)) = load_cached_db_crypto(password) {
        (salt, key)
    } else if path.exists() {
        let mut resolved: Option<(Vec<u8>, [u8; 32])> = None;
        if let Ok(raw) = fs::read_to_string(path.as_path()) {
            if let Ok(envelope) = serde_json::from_str::<CryptoEnvelope>(raw.as_str()) {
                if let Ok(salt) = decode_b64(envelope.salt.as_str()) {
                    if !salt.is_empty() {
                        let key = derive_key(password, salt.as_slice(), DEFAULT_PBKDF2_ITERATIONS);
                        resolved = Some((salt, key));
                    }
                }
            }
        }
        match resolved {
            Some(value) => value,
            None => {
                let mut fresh_salt = [0u8; 16];
                OsRng.fill_bytes(&mut fresh_salt);
                let key = derive_key(password, &fresh_salt, DEFAULT_PBKDF2_ITERATIONS);
                (fresh_salt.to_vec(), key)
            }
        }
    } else {
        let mut fresh_salt = [0u8; 16];
        OsRng.fill_bytes(&mut fresh_salt);
        let key = derive_key(password, &fresh_salt, DEFAULT_PBKDF2_ITERATIONS);
        (fresh_salt.to_vec(), key)
    };
    let envelope = encrypt_text_with_key(plaintext.as_str(), salt.as_slice(), &key)?;
    let content = serde_json::to_string(&envelope).map_err(|err| err.to_string())?;
    write_text_file(path, content.as_str())?;
    store_cached_db_value(password, &normalized);
    store_cached_db_crypto(password, salt.as_slice(), key);
    Ok(())
}

fn default_db_value() -> serde_json::Value {
    json!({
        "version": DB_VERSION,
        "activities": [],
        "weekly": {},
        "notes": [],
    })
}

fn ensure_db_shape_value(value: serde_json::Value) -> serde_json::Value {
    if !value.is_object() {
        return default_db_value();
    }
    let mut out = value;
    let Some(obj) = out.as_object_mut() else {
        return default_db_value();
    };
    if !obj.get("version").is_some_and(|v| v.is_number()) {
        obj.insert("version".to_string(), json!(DB_VERSION));
    }
    if !obj.get("activities").is_some_and(|v| v.is_array()) {
        obj.insert("activities".to_string(), json!([]));
    }
    if !obj.get("weekly").is_some_and(|v| v.is_object()) {
        obj.insert("weekly".to_string(), json!({}));
    }
    if !obj.get("notes").is_some_and(|v| v.is_array()) {
        obj.insert("notes".to_string(), json!([]));
    }
    out
}

fn write_text_file(path: PathBuf, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    fs::write(path, content).map_err(|err| err.to_string())?;
    Ok(())
}

fn write_binary_file(path: PathBuf, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    fs::write(path, bytes).map_err(|err| err.to_string())?;
    Ok(())
}

fn path_has_storage_data(root: &Path) -> bool {
    storage_root_score(root) > 0
}

fn storage_root_score(root: &Path) -> i64 {
    if !root.exists() {
        return -1;
    }

    let mut score = 0_i64;
    let data_path = root.join(DATA_FILE);
    if data_path.is_file() {
        score += 50;
        if let Ok(meta) = fs::metadata(data_path) {
            // Prefer roots that appear to contain real historical data.
            score += ((meta.len() / 1024) as i64).min(10_000);
        }
    }
    if root.join(AUTH_FILE).is_file() {
        score += 10;
    }

    score
}

fn legacy_storage_roots(app: &AppHandle) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut push_unique = |path: PathBuf| {
        if !roots.iter().any(|existing| existing == &path) {
            roots.push(path);
        }
    };

    if let Ok(documents) = app.path().document_dir() {
        push_unique(documents.join("PlanerCBT"));
    }
    if let Ok(config) = app.path().config_dir() {
        push_unique(config.join("planer-cbt"));
        push_unique(config.join("PlanerCBT"));
    }
    if let Ok(data) = app.path().data_dir() {
        push_unique(data.join("planer-cbt"));
        push_unique(data.join("PlanerCBT"));
    }
    if let Ok(home) = app.path().home_dir() {
        push_unique(home.join(".config").join("planer-cbt"));
        push_unique(home.join(".local").join("share").join("planer-cbt"));
        push_unique(
            home.join("Library")
                .join("Application Support")
                .join("PlanerCBT"),
        );
        push_unique(home.join("AppData").join("Roaming").join("PlanerCBT"));
    }

    roots
}

fn storage_root_dir(app: &AppHandle) -> Result<PathBuf, String> {
    static RESOLVED_ROOT: OnceLock<PathBuf> = OnceLock::new();
    if let Some(root) = RESOLVED_ROOT.get() {
        return Ok(root.clone());
    }

    let base = app.path().app_data_dir().map_err(|err| err.to_string())?;
    let default_root = base.join("PlanerCBT");
    fs::create_dir_all(default_root.as_path()).map_err(|err| err.to_string())?;

    let mut resolved = default_root.clone();
    let mut best_score = storage_root_score(default_root.as_path());
    for legacy in legacy_storage_roots(app) {
        if legacy == default_root || !path_has_storage_data(legacy.as_path()) {
            continue;
        }
        let score = storage_root_score(legacy.as_path());
        if score > best_score {
            best_score = score;
            resolved = legacy;
        }
    }

    fs::create_dir_all(resolved.as_path()).map_err(|err| err.to_string())?;
    let _ = RESOLVED_ROOT.set(resolved.clone());
    Ok(resolved)
}

fn sanitize_filename(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "planer-cbt-export".to_string()
    } else {
        trimmed.to_string()
    }
}

fn sanitize_export_filename(value: &str, extension: &str) -> String {
    let trimmed = clamp_string(value, 255, true);
    let safe = sanitize_filename(trimmed.as_str());
    if safe.to_lowercase().ends_with(extension) {
        safe
    } else {
        format!("{safe}{extension}")
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

fn decode_b64(value: &str) -> Result<Vec<u8>, String> {
    B64.decode(value).map_err(|err| err.to_string())
}

fn encode_b64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

fn main() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_clipboard_manager::init())
        .invoke_handler(tauri::generate_handler![
            app_version,
            platform_name,
            storage_info,
            clipboard_write,
            open_external,
            week_info,
            auth_read,
            auth_setup,
            auth_verify,
            auth_change,
            db_activities_get,
            db_activities_add,
            db_activities_update,
            db_activities_delete,
            db_day_summary,
            db_weekly_get,
            db_weekly_set_scores,
            db_weekly_set_summaries,
            db_weekly_set_day,
            db_weekly_trend,
            db_notes_get,
            db_notes_add,
            db_notes_delete,
            export_daily_pdf,
            export_weekly_pdf,
            pick_backup_file,
            backup_export,
            backup_import
        ])
        .run(tauri::generate_context!())
        .expect("failed to run Planer CBT");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_db() -> serde_json::Value {
        ensure_db_shape_value(json!({}))
    }

    fn activity(date: &str, hour: &str, name: &str) -> serde_json::Value {
        build_activity_entry(
            &json!({ "activity": name, "pleasure": 5, "mastery": 5 }),
            date,
            hour,
        )
    }

    #[test]
    fn week_key_matches_iso_numbering() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        assert_eq!(week_key_for_date(date), "2026-W32");

        let boundary = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(week_key_for_date(boundary), "2025-W01");

        let long_year = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert_eq!(week_key_for_date(long_year), "2020-W53");
    }

    #[test]
    fn week_key_round_trips_through_dates() {
        for key in ["2026-W01", "2025-W52", "2020-W53", "2026-W32"] {
            for day_index in 0..7 {
                let date = date_from_week_key(key, day_index).unwrap();
                assert_eq!(week_key_for_date(date), key, "key {key} day {day_index}");
            }
        }
    }

    #[test]
    fn parse_week_key_rejects_bad_input() {
        assert!(parse_week_key("garbage").is_err());
        assert!(parse_week_key("2026-W00").is_err());
        // 2025 has 52 ISO weeks.
        assert!(parse_week_key("2025-W53").is_err());
        assert!(parse_week_key("2020-W53").is_ok());
        assert!(date_from_week_key("2026-W32", 7).is_err());
    }

    #[test]
    fn adjacent_week_key_crosses_year_boundaries() {
        assert_eq!(adjacent_week_key("2025-W52", "next").unwrap(), "2026-W01");
        assert_eq!(adjacent_week_key("2026-W01", "prev").unwrap(), "2025-W52");
        assert_eq!(adjacent_week_key("2020-W53", "next").unwrap(), "2021-W01");
    }

    #[test]
    fn full_week_range_formats_polish_dates() {
        assert_eq!(
            full_week_range("2026-W32").unwrap(),
            "03.08.2026 - 09.08.2026"
        );
        assert_eq!(full_week_range("").unwrap(), "");
    }

    #[test]
    fn day_label_uses_genitive_month() {
        assert_eq!(
            day_label("2026-W32", 3).unwrap(),
            "Czwartek, 06 sierpnia 2026"
        );
        assert_eq!(
            day_label("2026-W01", 0).unwrap(),
            "Poniedziałek, 29 grudnia 2025"
        );
    }

    #[test]
    fn fold_polish_accents_covers_both_cases() {
        assert_eq!(fold_polish_accents("Zażółć gęślą jaźń"), "Zazolc gesla jazn");
        assert_eq!(fold_polish_accents("hiperfokus"), "hiperfokus");
    }

    #[test]
    fn clamp_string_strips_controls_and_truncates() {
        assert_eq!(clamp_string("  ab\u{7}c  ", 10, true), "abc");
        assert_eq!(clamp_string("abcdef", 3, false), "abc");
    }

    #[test]
    fn clamp_text_keeps_newlines() {
        assert_eq!(
            clamp_text("line one\nline two\u{0}", 100),
            "line one\nline two"
        );
    }

    #[test]
    fn parse_clock_time_normalizes() {
        assert_eq!(parse_clock_time("9:5").as_deref(), Some("09:05"));
        assert_eq!(parse_clock_time(" 14:30 ").as_deref(), Some("14:30"));
        assert!(parse_clock_time("24:00").is_none());
        assert!(parse_clock_time("0930").is_none());
    }

    #[test]
    fn envelope_round_trip_and_wrong_password() {
        let envelope = encrypt_text("sekretny wpis", "correct horse").unwrap();
        assert_eq!(envelope.v, 1);
        let decrypted = decrypt_envelope(&envelope, "correct horse").unwrap();
        assert_eq!(decrypted.as_deref(), Some("sekretny wpis"));
        let wrong = decrypt_envelope(&envelope, "wrong").unwrap();
        assert!(wrong.is_none());
    }

    #[test]
    fn ensure_db_shape_fills_missing_collections() {
        let shaped = ensure_db_shape_value(json!({ "activities": "oops" }));
        assert!(shaped.get("activities").unwrap().is_array());
        assert!(shaped.get("weekly").unwrap().is_object());
        assert!(shaped.get("notes").unwrap().is_array());
        assert_eq!(value_i64(shaped.get("version")), DB_VERSION as i64);

        let from_scalar = ensure_db_shape_value(json!("not a db"));
        assert!(from_scalar.get("activities").unwrap().is_array());
    }

    #[test]
    fn activities_sorted_by_hour_and_filtered_by_date() {
        let mut db = sample_db();
        {
            let rows = db_rows_mut(&mut db, "activities").unwrap();
            rows.push(activity("2026-08-06", "14:00", "spacer"));
            rows.push(activity("2026-08-06", "08:30", "śniadanie"));
            rows.push(activity("2026-08-07", "09:00", "inny dzień"));
        }
        let entries = activities_for_date(&db, "2026-08-06");
        assert_eq!(entries.len(), 2);
        assert_eq!(value_ref_string(entries[0].get("hour")), "08:30");
        assert_eq!(value_ref_string(entries[1].get("hour")), "14:00");
    }

    #[test]
    fn build_activity_entry_sanitizes_fields() {
        let entry = build_activity_entry(
            &json!({
                "activity": "  czytanie  ",
                "pleasure": 99,
                "mastery": -3,
                "is_pleasant": "NIE",
                "focus_state": "weird",
            }),
            "2026-08-06",
            "10:00",
        );
        assert_eq!(value_ref_string(entry.get("activity")), "czytanie");
        assert_eq!(value_i64(entry.get("pleasure")), 10);
        assert_eq!(value_i64(entry.get("mastery")), 0);
        assert_eq!(value_ref_string(entry.get("is_pleasant")), "Nie");
        assert_eq!(value_ref_string(entry.get("focus_state")), FOCUS_CALM);
        assert!(!value_ref_string(entry.get("id")).is_empty());
    }

    #[test]
    fn day_summary_skips_focus_only_entries() {
        let focus_only =
            build_activity_entry(&json!({ "focus_state": "chaos" }), "2026-08-06", "07:00");
        let low = build_activity_entry(
            &json!({ "activity": "sprzątanie", "mastery": 3, "pleasure": 2 }),
            "2026-08-06",
            "09:00",
        );
        let high = build_activity_entry(
            &json!({ "activity": "bieganie", "mastery": 8, "pleasure": 9 }),
            "2026-08-06",
            "11:00",
        );
        let summary = day_summary_value(&[focus_only, low, high]);
        assert_eq!(value_i64(summary.get("full_count")), 2);
        assert_eq!(value_i64(summary.get("focus_count")), 1);
        assert_eq!(
            value_ref_string(summary.get("top_mastery").and_then(|v| v.get("activity"))),
            "bieganie"
        );
        assert_eq!(
            value_ref_string(summary.get("top_pleasure").and_then(|v| v.get("activity"))),
            "bieganie"
        );
    }

    #[test]
    fn day_summary_ties_keep_the_later_entry() {
        let first = build_activity_entry(
            &json!({ "activity": "pierwsza", "mastery": 7 }),
            "2026-08-06",
            "09:00",
        );
        let second = build_activity_entry(
            &json!({ "activity": "druga", "mastery": 7 }),
            "2026-08-06",
            "10:00",
        );
        let summary = day_summary_value(&[first, second]);
        assert_eq!(
            value_ref_string(summary.get("top_mastery").and_then(|v| v.get("activity"))),
            "druga"
        );
    }

    #[test]
    fn weekly_shape_creates_all_days_and_periods() {
        let mut entry = json!({});
        let changed = ensure_weekly_shape(&mut entry, "2026-W32", "03.08.2026", "09.08.2026");
        assert!(changed);
        assert_eq!(value_ref_string(entry.get("week_start")), "03.08.2026");
        let days = entry.get("days").and_then(|v| v.as_object()).unwrap();
        assert_eq!(days.len(), 7);
        for day in DAY_NAMES {
            let tracker = days
                .get(day)
                .and_then(|v| v.get("mood_tracker"))
                .and_then(|v| v.as_object())
                .unwrap();
            assert_eq!(tracker.len(), 3);
        }
        let unchanged = ensure_weekly_shape(&mut entry, "2026-W32", "03.08.2026", "09.08.2026");
        assert!(!unchanged);
    }

    #[test]
    fn weekly_entry_mut_persists_default_document() {
        let mut db = sample_db();
        {
            let (entry, changed) = weekly_entry_mut(&mut db, "2026-W32").unwrap();
            assert!(changed);
            assert_eq!(value_ref_string(entry.get("week_key")), "2026-W32");
            assert_eq!(value_ref_string(entry.get("week_end")), "09.08.2026");
        }
        let (_, changed_again) = weekly_entry_mut(&mut db, "2026-W32").unwrap();
        assert!(!changed_again);
    }

    #[test]
    fn tracker_average_divides_by_three_periods() {
        let mut entry = json!({});
        ensure_weekly_shape(&mut entry, "2026-W32", "03.08.2026", "09.08.2026");
        let plan = entry
            .get_mut("days")
            .and_then(|v| v.get_mut("Poniedziałek"))
            .unwrap();
        plan["mood_tracker"]["rano"]["mood"] = json!(4);
        plan["mood_tracker"]["poludnie"]["mood"] = json!(6);
        plan["mood_tracker"]["wieczor"]["mood"] = json!(8);
        plan["mood_tracker"]["rano"]["energy"] = json!(5);

        let trend = weekly_trend_value(&entry);
        let monday = trend.get(0).unwrap();
        assert_eq!(monday.get("mood").unwrap().as_f64().unwrap(), 6.0);
        assert_eq!(monday.get("energy").unwrap().as_f64().unwrap(), 1.7);
        assert_eq!(value_ref_string(monday.get("name")), "Poniedziałek");
    }

    #[test]
    fn sanitize_day_plan_validates_category_and_status() {
        let plan = sanitize_day_plan(&json!({
            "activity": "spacer w parku",
            "category": "relacje",
            "status": "wrong",
            "mood_after": 22,
            "mood_tracker": { "rano": { "mood": 7, "note": "ok" } },
        }));
        assert_eq!(value_ref_string(plan.get("category")), "relacje");
        assert_eq!(value_ref_string(plan.get("status")), "");
        assert_eq!(value_i64(plan.get("mood_after")), 10);
        assert_eq!(
            value_i64(
                plan.get("mood_tracker")
                    .and_then(|t| t.get("rano"))
                    .and_then(|s| s.get("mood"))
            ),
            7
        );
        assert_eq!(
            value_i64(
                plan.get("mood_tracker")
                    .and_then(|t| t.get("wieczor"))
                    .and_then(|s| s.get("energy"))
            ),
            0
        );
    }

    #[test]
    fn notes_sort_newest_first() {
        let mut db = sample_db();
        {
            let rows = db_rows_mut(&mut db, "notes").unwrap();
            rows.push(json!({ "id": "a", "title": "stara", "created_at": "100" }));
            rows.push(json!({ "id": "b", "title": "nowa", "created_at": "300" }));
            rows.push(json!({ "id": "c", "title": "środkowa", "created_at": "200" }));
        }
        let notes = sorted_notes(&db);
        assert_eq!(value_ref_string(notes[0].get("id")), "b");
        assert_eq!(value_ref_string(notes[1].get("id")), "c");
        assert_eq!(value_ref_string(notes[2].get("id")), "a");
    }

    #[test]
    fn merge_store_prefers_incoming_rows() {
        let mut target = sample_db();
        {
            let rows = db_rows_mut(&mut target, "activities").unwrap();
            rows.push(json!({ "id": "keep", "date": "2026-08-06", "activity": "stare" }));
            rows.push(json!({ "id": "shared", "date": "2026-08-06", "activity": "stare" }));
        }
        let mut incoming = sample_db();
        {
            let rows = db_rows_mut(&mut incoming, "activities").unwrap();
            rows.push(json!({ "id": "shared", "date": "2026-08-06", "activity": "nowe" }));
            rows.push(json!({ "id": "fresh", "date": "2026-08-07", "activity": "dodane" }));
        }
        incoming["weekly"]["2026-W32"] = json!({ "week_key": "2026-W32" });

        merge_store(&mut target, &incoming);
        let rows = target.get("activities").and_then(|v| v.as_array()).unwrap();
        assert_eq!(rows.len(), 3);
        let shared = rows
            .iter()
            .find(|row| value_ref_string(row.get("id")) == "shared")
            .unwrap();
        assert_eq!(value_ref_string(shared.get("activity")), "nowe");
        assert!(target["weekly"].get("2026-W32").is_some());
    }

    #[test]
    fn validate_store_basic_flags_broken_collections() {
        assert!(validate_store_basic(&json!("nope")).is_some());
        assert!(validate_store_basic(
            &json!({ "version": 99, "activities": [], "weekly": {}, "notes": [] })
        )
        .is_some());
        assert!(validate_store_basic(
            &json!({ "version": 1, "activities": [{ "id": "", "date": "x" }], "weekly": {}, "notes": [] })
        )
        .is_some());
        assert!(validate_store_basic(&sample_db()).is_none());
    }

    #[test]
    fn sanitize_export_filename_appends_extension() {
        assert_eq!(
            sanitize_export_filename("plan-cbt-2026-08-06.pdf", ".pdf"),
            "plan-cbt-2026-08-06.pdf"
        );
        assert_eq!(sanitize_export_filename("", ".enc"), "planer-cbt-export.enc");
        let folded = sanitize_export_filename("raport sierpnia", ".pdf");
        assert!(folded.ends_with(".pdf"));
    }

    #[test]
    fn truncate_to_width_flattens_and_shortens() {
        assert_eq!(truncate_to_width("linia\njeden", 100.0, 8.0), "linia jeden");
        let short = truncate_to_width("bardzo długi opis aktywności", 10.0, 8.0);
        assert!(short.ends_with("..."));
        assert!(short.chars().count() <= 10);
    }

    #[test]
    fn daily_report_renders_pdf_bytes() {
        let entries = vec![
            build_activity_entry(&json!({ "focus_state": "chaos" }), "2026-08-06", "07:00"),
            build_activity_entry(
                &json!({
                    "activity": "poranna kawa",
                    "context": "kuchnia",
                    "pleasure": 8,
                    "mastery": 3,
                    "emotion": "spokój",
                    "emotion_intensity": 4,
                    "focus_state": "hiperfokus",
                    "notes": "dobry start",
                }),
                "2026-08-06",
                "08:00",
            ),
        ];
        let bytes = build_daily_report(entries.as_slice(), "2026-08-06").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn daily_report_handles_empty_day_and_long_days() {
        let empty = build_daily_report(&[], "2026-08-06").unwrap();
        assert!(empty.starts_with(b"%PDF"));

        let mut entries = Vec::new();
        for index in 0..120 {
            let hour = format!("{:02}:{:02}", index % 24, (index * 7) % 60);
            entries.push(build_activity_entry(
                &json!({ "activity": format!("wpis {index}") }),
                "2026-08-06",
                hour.as_str(),
            ));
        }
        let long = build_daily_report(entries.as_slice(), "2026-08-06").unwrap();
        assert!(long.starts_with(b"%PDF"));
        assert!(long.len() > empty.len());
    }

    #[test]
    fn weekly_report_renders_pdf_bytes() {
        let mut entry = json!({});
        ensure_weekly_shape(&mut entry, "2026-W32", "03.08.2026", "09.08.2026");
        entry["days"]["Wtorek"]["activity"] = json!("telefon do przyjaciela");
        entry["days"]["Wtorek"]["category"] = json!("relacje");
        entry["days"]["Wtorek"]["status"] = json!("tak");
        entry["summaries"]["most_helpful"] = json!("krótkie spacery");

        let bytes = build_weekly_report(&entry, "2026-W32").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }
}
