mod config;
mod generator;
mod parser;
mod pipeline;
mod search;
mod server;
mod storage;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use generator::AnthropicGenerator;
use pipeline::{ResearchPipeline, ResearchRequest};
use search::BochaSearch;
use storage::{ConversationTurn, Database};
use utils::logger;

#[derive(Parser)]
#[command(name = "researchd")]
#[command(about = "联网检索 + 大模型生成的研究报告服务", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化配置和数据库
    Init,
    /// 启动 HTTP 服务
    Serve {
        /// 监听地址
        #[arg(long)]
        host: Option<String>,
        /// 监听端口
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// 在终端里生成一份研究报告
    Ask {
        /// 研究问题或主题
        query: String,
        /// 归属邮箱
        #[arg(short, long)]
        email: Option<String>,
        /// 大致字数
        #[arg(short, long)]
        word_limit: Option<u32>,
        /// 追加到已有会话
        #[arg(short, long)]
        thread_id: Option<String>,
    },
    /// 查看已保存的研究会话
    History {
        /// 按邮箱过滤
        #[arg(short, long)]
        email: Option<String>,
        /// 最多显示条数
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
        /// 显示指定会话的完整对话
        #[arg(short, long)]
        thread_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_command().await?;
        }
        Commands::Serve { host, port } => {
            serve_command(host, port).await?;
        }
        Commands::Ask {
            query,
            email,
            word_limit,
            thread_id,
        } => {
            ask_command(query, email, word_limit, thread_id).await?;
        }
        Commands::History {
            email,
            limit,
            thread_id,
        } => {
            history_command(email, limit, thread_id).await?;
        }
    }

    Ok(())
}

async fn init_command() -> Result<()> {
    info!("初始化系统...");

    tokio::fs::create_dir_all("data").await?;
    tokio::fs::create_dir_all("config").await?;

    if tokio::fs::try_exists(config::SETTINGS_PATH).await? {
        info!("配置文件已存在，跳过: {}", config::SETTINGS_PATH);
    } else {
        AppConfig::default().save(config::SETTINGS_PATH)?;
        info!("已生成配置文件: {}", config::SETTINGS_PATH);
    }

    let app_config = AppConfig::load()?;
    let db = Database::new(&app_config.database_url()).await?;
    db.init_schema().await?;

    info!("✅ 系统初始化完成！");
    info!("下一步:");
    info!("  1. 设置环境变量 SEARCH_API_KEY 与 ANTHROPIC_API_KEY");
    info!("  2. 运行 'researchd serve' 启动服务");

    Ok(())
}

/// 校验配置并组装流水线，密钥缺失时在接受任何请求前失败
async fn build_pipeline(app_config: &AppConfig) -> Result<ResearchPipeline> {
    app_config.validate()?;

    let db = Database::new(&app_config.database_url()).await?;
    db.init_schema().await?;

    let search = BochaSearch::new(app_config.search.clone())?;
    let generator = AnthropicGenerator::new(app_config.generator.clone())?;

    Ok(ResearchPipeline::new(
        Arc::new(search),
        Arc::new(generator),
        db,
        app_config.research.clone(),
    ))
}

async fn serve_command(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut app_config = AppConfig::load()?;
    if let Some(host) = host {
        app_config.server.host = host;
    }
    if let Some(port) = port {
        app_config.server.port = port;
    }

    let pipeline = build_pipeline(&app_config).await?;
    let state = server::AppState {
        pipeline: Arc::new(pipeline),
        request_timeout: Duration::from_secs(app_config.server.request_timeout_secs),
    };

    server::serve(&app_config.server, state).await
}

async fn ask_command(
    query: String,
    email: Option<String>,
    word_limit: Option<u32>,
    thread_id: Option<String>,
) -> Result<()> {
    let app_config = AppConfig::load()?;
    let pipeline = build_pipeline(&app_config).await?;

    let response = pipeline
        .run(ResearchRequest {
            messages: vec![ConversationTurn::user(query)],
            email,
            word_limit,
            thread_id,
        })
        .await?;

    if response.no_search_results.unwrap_or(false) {
        info!("⚠️ 未获得搜索结果，报告基于模型自身知识");
    }

    println!("{}", response.content);
    if !response.references.is_empty() {
        println!("\nReferences");
        for reference in &response.references {
            println!("{}", reference);
        }
    }

    info!("✅ 已保存，ID: {}", response.id);
    Ok(())
}

async fn history_command(email: Option<String>, limit: i64, thread_id: Option<String>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = Database::new(&app_config.database_url()).await?;
    db.init_schema().await?;

    if let Some(thread_id) = thread_id {
        match db.find_by_thread_id(&thread_id).await? {
            Some(thread) => {
                for turn in &thread.conversation {
                    println!("[{:?}] {}\n", turn.role, turn.content);
                }
                for reference in &thread.references {
                    println!("{}", reference);
                }
            }
            None => info!("未找到会话: {}", thread_id),
        }
        return Ok(());
    }

    let threads = db.list_threads(email.as_deref(), limit).await?;
    if threads.is_empty() {
        info!("没有已保存的研究会话");
        return Ok(());
    }

    for thread in &threads {
        println!(
            "{}  {}  [{}]  {} 轮对话  {}",
            thread.timestamp,
            thread.id,
            thread.thread_id.as_deref().unwrap_or("-"),
            thread.conversation.len(),
            thread.prompt
        );
    }

    Ok(())
}
