use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::info;

use sugang_macro::config::Config;
use sugang_macro::infrastructure::{keys, SettingsStore};
use sugang_macro::models::{load_subjects_file, Alignment, CourseQuery, Credential};
use sugang_macro::orchestrator::{App, RunOptions};
use sugang_macro::services::fetch_server_clock;
use sugang_macro::utils::logging;

#[derive(Parser)]
#[command(name = "sugang-macro", version, about = "수강신청 자동 로그인 / 매크로")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 打开浏览器并运行自动登录（以及可选的定时 / 宏循环）
    Run {
        /// 在整点或半点自动登录
        #[arg(long, value_enum)]
        align: Option<Alignment>,
        /// 启动后立即开始宏循环
        #[arg(long = "macro")]
        start_macro: bool,
        /// 定时登录时自动点击登录按钮
        #[arg(long)]
        full_auto: bool,
    },
    /// 管理登录凭据
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },
    /// 管理要抢的科目
    Subjects {
        #[command(subcommand)]
        action: SubjectsAction,
    },
    /// 查看或修改开关
    Flags {
        #[command(subcommand)]
        action: FlagsAction,
    },
    /// 显示服务器时间与本机偏差
    Time,
}

#[derive(Subcommand)]
enum CredentialAction {
    Set {
        /// 学号
        identifier: String,
        /// 密码
        #[arg(env = "SUGANG_PASSWORD", hide_env_values = true)]
        secret: String,
    },
    Reset,
    Show,
}

#[derive(Subcommand)]
enum SubjectsAction {
    Add {
        /// 科目代码，例如 COSE101
        code: String,
        /// 科目名称（可选）
        #[arg(default_value = "")]
        name: String,
    },
    List,
    Clear,
    /// 从 TOML 文件导入（`[[subjects]]`），覆盖现有列表
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum FlagsAction {
    Show,
    Set {
        flag: Flag,
        #[arg(action = ArgAction::Set)]
        value: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Flag {
    DarkTheme,
    FastAccess,
    BypassMode,
    SaveLogin,
}

impl Flag {
    fn key(self) -> &'static str {
        match self {
            Flag::DarkTheme => keys::DARK_THEME,
            Flag::FastAccess => keys::FAST_ACCESS,
            Flag::BypassMode => keys::BYPASS_MODE,
            Flag::SaveLogin => keys::SAVE_LOGIN,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    match cli.command {
        Command::Run {
            align,
            start_macro,
            full_auto,
        } => {
            let options = RunOptions {
                align,
                start_macro,
                full_auto,
            };
            App::initialize(config).await?.run(options).await?;
        }
        Command::Credential { action } => credential(&open_store(&config)?, action)?,
        Command::Subjects { action } => subjects(&open_store(&config)?, action).await?,
        Command::Flags { action } => flags(&open_store(&config)?, action)?,
        Command::Time => {
            let clock = fetch_server_clock(&config.target_url).await?;
            println!("服务器时间: {}", clock.server_local().format("%Y-%m-%d %H:%M:%S"));
            println!("本机偏差: {:+}ms", clock.offset.num_milliseconds());
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<SettingsStore> {
    SettingsStore::open(&config.store_path)
        .with_context(|| format!("无法打开设置文件 {}", config.store_path))
}

fn credential(store: &SettingsStore, action: CredentialAction) -> Result<()> {
    match action {
        CredentialAction::Set { identifier, secret } => {
            if identifier.trim().is_empty() || secret.is_empty() {
                bail!("学号和密码都不能为空");
            }
            store.set_credential(&Credential::new(identifier.trim(), secret))?;
        }
        CredentialAction::Reset => {
            if !store.reset_credential()? {
                info!("没有已保存的凭据");
            }
        }
        CredentialAction::Show => match store.credential() {
            Some(credential) => println!("{}", credential.masked_identifier()),
            None => println!("(未设置)"),
        },
    }
    Ok(())
}

async fn subjects(store: &SettingsStore, action: SubjectsAction) -> Result<()> {
    match action {
        SubjectsAction::Add { code, name } => {
            if code.trim().is_empty() && name.trim().is_empty() {
                bail!("科目代码和名称不能同时为空");
            }
            let mut current = store.subjects();
            current.push(CourseQuery::new(code.trim(), name.trim()));
            store.set_subjects(&current)?;
        }
        SubjectsAction::List => {
            let current = store.subjects();
            if current.is_empty() {
                println!("(空)");
            }
            for (index, course) in current.iter().enumerate() {
                println!("{:>2}. {} {}", index + 1, course.code, course.name);
            }
        }
        SubjectsAction::Clear => store.set_subjects(&[])?,
        SubjectsAction::Import { path } => {
            let imported = load_subjects_file(&path).await?;
            store.set_subjects(&imported)?;
            info!("✓ 已从 {} 导入", path.display());
        }
    }
    Ok(())
}

fn flags(store: &SettingsStore, action: FlagsAction) -> Result<()> {
    match action {
        FlagsAction::Show => {
            for key in keys::FLAGS {
                println!("{:<12} {}", key, store.flag(key));
            }
        }
        FlagsAction::Set { flag, value } => store.set_flag(flag.key(), value)?,
    }
    Ok(())
}
