use crate::board::Board;
use crate::config::SNAPSHOT_TTL;
use crate::leaderboard::paginate;
use abi::IeError;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub page: Option<usize>,
    pub kind: Option<String>,
}

pub fn routes(
    board: Arc<Board>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    let health_check = warp::path("health_check")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "ok": true })).into_response());

    let leaderboard = warp::path("leaderboard")
        .and(warp::get())
        .and(warp::query::<LeaderboardQuery>())
        .and(with_board(board.clone()))
        .and_then(handle_leaderboard);

    let bubblemap = warp::path("bubblemap")
        .and(warp::get())
        .and(with_board(board.clone()))
        .and_then(handle_bubblemap);

    let summary = warp::path("summary")
        .and(warp::get())
        .and(with_board(board.clone()))
        .and_then(handle_summary);

    let refresh = warp::path("refresh")
        .and(warp::post())
        .and(with_board(board))
        .and_then(handle_refresh);

    health_check
        .or(leaderboard)
        .unify()
        .or(bubblemap)
        .unify()
        .or(summary)
        .unify()
        .or(refresh)
        .unify()
}

fn with_board(board: Arc<Board>) -> impl Filter<Extract = (Arc<Board>,), Error = Infallible> + Clone {
    warp::any().map(move || board.clone())
}

async fn handle_leaderboard(query: LeaderboardQuery, board: Arc<Board>) -> Result<Response, warp::Rejection> {
    let snapshot = match board.current(SNAPSHOT_TTL).await {
        Ok(snapshot) => snapshot,
        Err(e) => return Ok(unavailable(e)),
    };
    let page = query.page.unwrap_or(1);
    let page_size = board.config().page_size;

    let reply = match query.kind.as_deref().unwrap_or("balance") {
        "balance" => warp::reply::json(&paginate(&snapshot.holders, page, page_size)),
        "days" => warp::reply::json(&paginate(&snapshot.days_held, page, page_size)),
        other => {
            return Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "error": format!("unknown leaderboard kind: {}", other) })),
                StatusCode::BAD_REQUEST,
            )
            .into_response())
        }
    };
    Ok(reply.into_response())
}

async fn handle_bubblemap(board: Arc<Board>) -> Result<Response, warp::Rejection> {
    Ok(match board.current(SNAPSHOT_TTL).await {
        Ok(snapshot) => warp::reply::json(&snapshot.hierarchy).into_response(),
        Err(e) => unavailable(e),
    })
}

async fn handle_summary(board: Arc<Board>) -> Result<Response, warp::Rejection> {
    Ok(match board.current(SNAPSHOT_TTL).await {
        Ok(snapshot) => warp::reply::json(&snapshot.summary).into_response(),
        Err(e) => unavailable(e),
    })
}

async fn handle_refresh(board: Arc<Board>) -> Result<Response, warp::Rejection> {
    Ok(match board.refresh().await {
        Ok(snapshot) => {
            info!("manual refresh: {} holders", snapshot.holders.len());
            warp::reply::json(&json!({ "holders": snapshot.holders.len() })).into_response()
        }
        Err(e) => unavailable(e),
    })
}

fn unavailable(e: IeError) -> Response {
    warn!("view unavailable: {}", e);
    warp::reply::with_status(
        warp::reply::json(&json!({ "error": e.to_string(), "retry": e.is_retryable() })),
        StatusCode::SERVICE_UNAVAILABLE,
    )
    .into_response()
}
