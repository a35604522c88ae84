use actix_files::{file_extension_to_mime, HttpRange, NamedFile};
use actix_web::http::header::{
    self, ContentType, EntityTag, HttpDate, IfMatch, IfModifiedSince, IfNoneMatch,
    IfUnmodifiedSince,
};
use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpMessage, HttpRequest, HttpResponse};
use std::fs::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::library::preload::CachedVideo;
use crate::library::{Library, VideoSource};
use crate::web::models::{
    ApiError, ErrorBody, RandomClip, RandomQuery, SessionEnded, SessionRequest, SessionStarted,
};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(tree)
        .service(random)
        .service(video)
        .service(session_start)
        .service(session_end)
        .service(cache_status);
}

#[get("/tree")]
pub async fn tree(library: web::Data<Library>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(library.tree().await?))
}

#[get("/random")]
pub async fn random(
    library: web::Data<Library>,
    query: web::Query<RandomQuery>,
) -> Result<HttpResponse, ApiError> {
    let target = query.target.as_deref();
    match library.random_clip(target, query.is_preview()).await? {
        Some(clip) => Ok(HttpResponse::Ok().json(RandomClip::from(clip))),
        None => {
            debug!("No videos under {:?}", target);
            Ok(HttpResponse::Ok().json(ErrorBody::new("no videos")))
        }
    }
}

// Served from the preload cache when possible, else straight from disk.
// Both paths answer with the same headers, range and conditional handling.
#[get("/video/{path:.*}")]
pub async fn video(
    req: HttpRequest,
    library: web::Data<Library>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let rel = path.into_inner();
    match library.video(&rel).await? {
        VideoSource::Cached(video) => {
            debug!("Serving {rel} from cache");
            Ok(cached_response(&req, &rel, video))
        }
        VideoSource::Disk(file) => {
            debug!("Serving {rel} from disk");
            let file = NamedFile::open_async(&file)
                .await
                .map_err(|_| ApiError::NotFound)?
                .disable_content_disposition();
            Ok(file.into_response(&req))
        }
    }
}

// Mirrors how actix-files answers for a file on disk: the same validators,
// then range parsing, then the If-* preconditions.
fn cached_response(req: &HttpRequest, name: &str, cached: CachedVideo) -> HttpResponse {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let modified = cached.metadata.modified().ok();
    let etag = entity_tag(&cached.metadata);

    let precondition_failed = if !any_match(etag.as_ref(), req) {
        true
    } else if let (Some(m), Some(IfUnmodifiedSince(since))) = (modified, req.get_header()) {
        matches!((epoch_secs(m), epoch_secs(since.into())), (Some(m), Some(s)) if m > s)
    } else {
        false
    };

    let not_modified = if !none_match(etag.as_ref(), req) {
        true
    } else if req.headers().contains_key(header::IF_NONE_MATCH) {
        false
    } else if let (Some(m), Some(IfModifiedSince(since))) = (modified, req.get_header()) {
        matches!((epoch_secs(m), epoch_secs(since.into())), (Some(m), Some(s)) if m <= s)
    } else {
        false
    };

    let mut res = HttpResponse::Ok();
    res.insert_header(ContentType(file_extension_to_mime(ext)));
    if let Some(m) = modified {
        res.insert_header((header::LAST_MODIFIED, HttpDate::from(m).to_string()));
    }
    if let Some(etag) = &etag {
        res.insert_header((header::ETAG, etag.to_string()));
    }
    res.insert_header((header::ACCEPT_RANGES, "bytes"));

    let size = cached.data.len() as u64;
    let mut offset = 0;
    let mut length = size;

    if let Some(range) = req.headers().get(header::RANGE) {
        let Ok(range) = range.to_str() else {
            return res.status(StatusCode::BAD_REQUEST).finish();
        };
        match HttpRange::parse(range, size).ok().and_then(|r| r.first().cloned()) {
            Some(range) => {
                offset = range.start;
                length = range.length;
                res.insert_header((
                    header::CONTENT_RANGE,
                    format!(
                        "bytes {}-{}/{}",
                        offset,
                        (offset + length).saturating_sub(1),
                        size
                    ),
                ));
            }
            None => {
                return res
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .insert_header((header::CONTENT_RANGE, format!("bytes */{size}")))
                    .finish();
            }
        }
    }

    if precondition_failed {
        return res.status(StatusCode::PRECONDITION_FAILED).finish();
    }
    if not_modified {
        return res.status(StatusCode::NOT_MODIFIED).finish();
    }

    if offset != 0 || length != size {
        res.status(StatusCode::PARTIAL_CONTENT);
    }
    res.body(cached.data.slice(offset as usize..(offset + length) as usize))
}

// Same format actix-files uses: inode, size and mtime in hex.
fn entity_tag(metadata: &Metadata) -> Option<EntityTag> {
    let mtime = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    Some(EntityTag::new_strong(format!(
        "{:x}:{:x}:{:x}:{:x}",
        inode(metadata),
        metadata.len(),
        mtime.as_secs(),
        mtime.subsec_nanos()
    )))
}

#[cfg(unix)]
fn inode(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode(_: &Metadata) -> u64 {
    0
}

fn epoch_secs(t: SystemTime) -> Option<u64> {
    t.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

fn any_match(etag: Option<&EntityTag>, req: &HttpRequest) -> bool {
    match req.get_header::<IfMatch>() {
        None | Some(IfMatch::Any) => true,
        Some(IfMatch::Items(items)) => {
            etag.is_some_and(|etag| items.iter().any(|item| item.strong_eq(etag)))
        }
    }
}

fn none_match(etag: Option<&EntityTag>, req: &HttpRequest) -> bool {
    match req.get_header::<IfNoneMatch>() {
        None => true,
        Some(IfNoneMatch::Any) => false,
        Some(IfNoneMatch::Items(items)) => {
            !etag.is_some_and(|etag| items.iter().any(|item| item.weak_eq(etag)))
        }
    }
}

#[post("/session/start")]
pub async fn session_start(
    library: web::Data<Library>,
    body: web::Json<SessionRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = body.into_inner().id;
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest("missing session id".to_string()));
    }

    let cache = library.cache();
    if cache.start_session(&id).await {
        info!("Session {id} started preloading");
    }
    debug!("{} sessions active", cache.session_count().await);
    Ok(HttpResponse::Ok().json(SessionStarted { ok: true, id }))
}

#[post("/session/end")]
pub async fn session_end(
    library: web::Data<Library>,
    body: web::Json<SessionRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = body.into_inner().id;
    if library.cache().end_session(&id).await {
        info!("Session {id} was the last one, cache cleared");
    }
    Ok(HttpResponse::Ok().json(SessionEnded { ok: true }))
}

#[get("/cache/status")]
pub async fn cache_status(library: web::Data<Library>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(library.cache().status().await?))
}
