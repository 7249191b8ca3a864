// src/server/mod.rs

//! 下载守护进程：HTTP 接口加一个逐个处理任务的后台调度器。

mod auth;
mod routes;
pub mod tasks;

pub use routes::{ApiError, CreateTaskRequest, TaskResponse};
pub use tasks::{DeleteResult, Task, TaskState, TaskStore};

use crate::{DownloadJobContext, error::*};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use log::info;
use std::sync::Arc;

#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<TaskStore>,
    pub context: DownloadJobContext,
}

pub fn create_router(state: ServerState, api_token: &str) -> Router {
    let token: Arc<str> = Arc::from(api_token.trim());
    Router::new()
        .route("/api/tasks", post(routes::create_task).get(routes::list_tasks))
        .route(
            "/api/tasks/:id",
            get(routes::get_task).delete(routes::delete_task),
        )
        .layer(middleware::from_fn_with_state(token, auth::require_bearer))
        .with_state(state)
}

/// 启动调度器并在给定地址上提供 HTTP 服务，直到进程退出
pub async fn run_server(
    context: DownloadJobContext,
    bind: &str,
    port: u16,
    api_token: &str,
) -> AppResult<()> {
    let store = Arc::new(TaskStore::new());
    tokio::spawn(tasks::run_dispatcher(store.clone(), context.clone()));

    let router = create_router(ServerState { store, context }, api_token);
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!("守护进程监听于 {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
