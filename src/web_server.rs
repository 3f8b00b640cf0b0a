use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::{ServerConfig, SessionConfig, StorageConfig};
use crate::queue::SubmissionQueue;
use crate::routes::{self, AppSettings, json_error_handler, query_error_handler};

pub fn build_server(
    server_config: ServerConfig,
    session_config: SessionConfig,
    storage_config: StorageConfig,
    db_pool: SqlitePool,
    queue: Arc<SubmissionQueue>,
) -> std::io::Result<Server> {
    let settings = web::Data::new(AppSettings {
        blocking: server_config.blocking.unwrap_or(true),
        session: session_config,
        test_files_dir: storage_config.test_files_dir(),
    });
    log::info!(
        "Storing test files under {}",
        settings.test_files_dir.display()
    );

    let db_pool = web::Data::new(db_pool);
    let queue = web::Data::from(queue);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(queue.clone())
            .app_data(settings.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
