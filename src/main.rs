use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use sqlx::sqlite::SqlitePool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use campus::auth::hash_password;
use campus::config::{CliArgs, CommissionConfig, Config, TeacherConfig};
use campus::database::{self as db, NewUser};
use campus::models::Role;
use campus::queue::SubmissionQueue;
use campus::web_server::build_server;
use campus::worker::{requeue_unfinished, worker};

/// Upserts configured commissions and creates missing teacher accounts
async fn bootstrap(
    commissions: &[CommissionConfig],
    teachers: &[TeacherConfig],
    pool: &SqlitePool,
) -> anyhow::Result<()> {
    for commission in commissions {
        db::upsert_commission(&commission.name, &commission.registration_code, pool).await?;
    }
    log::info!("Loaded {} commissions", commissions.len());

    for teacher in teachers {
        let email = teacher.email.trim().to_lowercase();
        if db::email_exists(&email, pool).await? {
            continue;
        }

        let password_hash = hash_password(&teacher.password)?;
        let new_user = NewUser {
            name: &teacher.name,
            last_name: &teacher.last_name,
            email: &email,
            dni: None,
            birth_date: None,
            role: Role::Teacher,
            commission_id: None,
        };
        let user = db::create_user(&new_user, &password_hash, pool).await?;
        log::info!("Created teacher account {} for {email}", user.id);
    }

    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_threads = cli.threads;

    if n_threads == 0 {
        bail!("The number of worker threads must not be 0");
    }

    let Config {
        server: server_config,
        session: session_config,
        grader: grader_config,
        storage: storage_config,
        commissions,
        teachers,
    } = cli
        .to_config()
        .with_context(|| format!("Failed to load configuration from {}", cli.config_path))?;

    let db_path = db::get_db_path()?;
    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .context("Failed to initialize database")?;

    bootstrap(&commissions, &teachers, &db_pool).await?;
    let purged = db::purge_expired_sessions(&db_pool).await?;
    if purged > 0 {
        log::info!("Purged {purged} expired sessions");
    }

    let grader_config = Arc::new(grader_config);
    let queue = Arc::new(SubmissionQueue::new());
    let requeued = requeue_unfinished(&db_pool, &queue)
        .await
        .context("Failed to requeue unfinished submissions")?;
    if requeued > 0 {
        log::info!("Requeued {requeued} submissions left unfinished by the last run");
    }
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=n_threads {
        workers.spawn(worker(
            i,
            grader_config.clone(),
            db_pool.clone(),
            queue.clone(),
            shutdown_token.clone(),
        ));
    }

    let server = build_server(
        server_config,
        session_config,
        storage_config,
        db_pool,
        queue,
    )
    .context("Failed to build server")?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {:?}", res_worker);
        }
    }

    // 1. Stop accepting requests
    server_handle.stop(true).await;

    // 2. Tell workers to stop
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for them to finish...");

    // 3. Wait for every worker
    while let Some(res) = workers.join_next().await {
        match res {
            Ok(Err(e)) => log::error!("Worker finished with error: {e:#}"),
            Err(e) if e.is_panic() => log::error!("Worker handle panicked: {:?}", e),
            Err(e) => log::error!("Worker handle finished with error: {:?}", e),
            Ok(Ok(())) => {}
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
