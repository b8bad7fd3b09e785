use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use epubsmith::epub::{diff, structure};
use epubsmith::{
    CoverSource, EmbedReport, EpubError, EpubsmithConfig, FinalMetadata, MetadataEmbedder, PreviewEngine,
    PreviewResult, Result,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 📚 epubsmith - EPUB元数据嵌入工具
#[derive(Parser)]
#[command(name = "epubsmith")]
#[command(about = "在EPUB容器内安全改写书目元数据")]
#[command(version)]
struct Cli {
    /// 详细输出模式
    #[arg(short, long, global = true, help = "输出调试日志")]
    verbose: bool,

    /// 配置文件路径
    #[arg(short, long, global = true, help = "YAML配置文件路径")]
    config: Option<PathBuf>,

    /// 以YAML输出结构化结果
    #[arg(long, global = true, help = "以YAML格式输出结果")]
    yaml: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出归档条目及其分类
    Inspect {
        /// EPUB文件路径
        epub_file: PathBuf,
    },

    /// 校验归档结构（不修改文件）
    Validate {
        /// EPUB文件路径
        epub_file: PathBuf,
    },

    /// 预览一次嵌入的效果
    Preview {
        /// EPUB文件路径
        epub_file: PathBuf,

        #[command(flatten)]
        metadata: MetadataArgs,

        /// 显示并排对比而不是统一差异
        #[arg(long)]
        side_by_side: bool,
    },

    /// 嵌入元数据并原地替换文件（先写 .bak 备份）
    Embed {
        /// EPUB文件路径，可指定多个
        #[arg(required = true)]
        epub_files: Vec<PathBuf>,

        #[command(flatten)]
        metadata: MetadataArgs,

        /// 重新打包前删除未被清单引用的图片
        #[arg(long)]
        remove_unused_images: bool,
    },

    /// 配置文件管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 写入默认配置文件
    Init {
        /// 输出路径
        #[arg(default_value = "epubsmith.yaml")]
        path: PathBuf,
    },
    /// 显示当前生效的配置
    Show,
}

/// 最终元数据参数
#[derive(Args)]
struct MetadataArgs {
    /// 书名
    #[arg(long)]
    title: Option<String>,

    /// 作者
    #[arg(long)]
    author: Option<String>,

    /// 语言代码
    #[arg(long)]
    language: Option<String>,

    /// 出版社
    #[arg(long)]
    publisher: Option<String>,

    /// 简介
    #[arg(long)]
    description: Option<String>,

    /// 封面图片路径
    #[arg(long)]
    cover: Option<PathBuf>,
}

impl MetadataArgs {
    fn into_metadata(self) -> FinalMetadata {
        FinalMetadata {
            title: self.title,
            author: self.author,
            language: self.language,
            publisher: self.publisher,
            description: self.description,
            cover: self.cover.map(CoverSource::Path),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "epubsmith=debug" } else { "epubsmith=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(cli) {
        eprintln!("❌ 错误: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EpubsmithConfig> {
    match path {
        Some(path) => EpubsmithConfig::from_file(path),
        None => Ok(EpubsmithConfig::shared_default().clone()),
    }
}

fn to_yaml<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_yml::to_string(value).map_err(|e| EpubError::ConfigError(format!("序列化输出失败: {}", e)))
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Inspect { epub_file } => inspect(&epub_file, cli.yaml),
        Commands::Validate { epub_file } => validate(&epub_file, config, cli.yaml),
        Commands::Preview {
            epub_file,
            metadata,
            side_by_side,
        } => preview(&epub_file, config, metadata.into_metadata(), side_by_side, cli.yaml),
        Commands::Embed {
            epub_files,
            metadata,
            remove_unused_images,
        } => embed(&epub_files, config, metadata.into_metadata(), remove_unused_images, cli.yaml),
        Commands::Config { action } => match action {
            ConfigAction::Init { path } => {
                EpubsmithConfig::write_default(&path)?;
                println!("✅ 默认配置已写入 {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                print!("{}", config.to_yaml_string()?);
                Ok(())
            }
        },
    }
}

fn inspect(path: &PathBuf, yaml: bool) -> Result<()> {
    let catalog = epubsmith::inspect(path)?;
    if yaml {
        print!("{}", to_yaml(&catalog.entries)?);
        return Ok(());
    }

    println!("\n📁 EPUB文件内容:");
    for (i, entry) in catalog.entries.iter().enumerate() {
        println!("  {}. {} ({} 字节, {:?})", i + 1, entry.path, entry.size, entry.kind);
    }
    match &catalog.opf_path {
        Some(opf) => println!("\n📄 OPF文件: {}", opf),
        None => println!("\n⚠️  没有找到OPF文件"),
    }
    Ok(())
}

fn validate(path: &PathBuf, config: EpubsmithConfig, yaml: bool) -> Result<()> {
    let embedder = MetadataEmbedder::new(config);
    let scratch = embedder.extract(path)?;
    let opf_path = MetadataEmbedder::locate_opf(scratch.path())?;
    let issues = structure::validate(scratch.path(), &opf_path)?;

    if yaml {
        print!("{}", to_yaml(&issues)?);
        return Ok(());
    }
    if issues.is_empty() {
        println!("✅ 结构有效");
        return Ok(());
    }

    println!("⚠️  发现 {} 个结构问题:", issues.len());
    for missing in &issues.missing_files {
        println!("  - 文件不存在: {} (id={})", missing.href, missing.id);
    }
    for broken in &issues.broken_refs {
        println!("  - {}", broken);
    }
    for nav in &issues.nav_issues {
        println!("  - {}", nav);
    }
    for spine in &issues.spine_issues {
        println!("  - {}", spine);
    }
    Ok(())
}

fn preview(
    path: &PathBuf,
    config: EpubsmithConfig,
    metadata: FinalMetadata,
    side_by_side: bool,
    yaml: bool,
) -> Result<()> {
    let result = PreviewEngine::new(config).preview(path, &metadata);
    if yaml {
        print!("{}", to_yaml(&result)?);
        return Ok(());
    }
    print_preview(&result, side_by_side);
    Ok(())
}

fn print_preview(result: &PreviewResult, side_by_side: bool) {
    if !result.has_changes() {
        println!("✅ 不会有任何改动");
        return;
    }

    if side_by_side {
        let rows = diff::side_by_side(&result.original_opf, &result.modified_opf);
        for (old, new) in &rows {
            let marker = if old == new { ' ' } else { '|' };
            println!(
                "{:<60} {} {}",
                old.as_deref().unwrap_or(""),
                marker,
                new.as_deref().unwrap_or("")
            );
        }
        let stats = diff::DiffStats::from_rows(&rows);
        println!(
            "\n📊 新增 {} 行, 删除 {} 行, 修改 {} 行",
            stats.added, stats.removed, stats.changed
        );
    } else {
        print!("{}", result.unified_diff("content.opf"));
    }

    let summary = result.change_summary();
    println!("\n📝 变更摘要: {:?}", summary);
    for file in &result.files_to_add {
        println!("  + {}", file);
    }
    for file in &result.files_to_modify {
        println!("  ~ {}", file);
    }
    for file in &result.files_to_remove {
        println!("  - {} (孤立图片)", file);
    }
}

fn embed(
    paths: &[PathBuf],
    config: EpubsmithConfig,
    metadata: FinalMetadata,
    remove_unused_images: bool,
    yaml: bool,
) -> Result<()> {
    let embedder = MetadataEmbedder::new(config).with_remove_unused_images(remove_unused_images);
    let mut failed = 0usize;

    for path in paths {
        match embedder.embed(path, &metadata) {
            Ok(report) => {
                if yaml {
                    print!("{}", to_yaml(&report)?);
                } else {
                    print_report(path, &report);
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("❌ {}: {}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        return Err(EpubError::InvalidEpub(format!("{} 个文件嵌入失败", failed)));
    }
    Ok(())
}

fn print_report(path: &PathBuf, report: &EmbedReport) {
    println!("🎉 {} 嵌入完成", path.display());
    println!("  备份: {}", report.backup_path.display());
    println!("  OPF: {}", report.opf_path);
    if let Some(cover) = &report.cover_path {
        println!("  封面: {}", cover);
    }
    for fix in &report.fixes {
        println!("  🔧 {}", fix);
    }
    for image in &report.removed_images {
        println!("  🗑️  {}", image);
    }
    if let Some(error) = &report.validation_error {
        println!("  ⚠️  校验失败: {}", error);
    }
}
