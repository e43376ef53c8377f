//! CLI 모듈
//!
//! insurance-rag CLI 명령어 정의 및 구현.
//! 설정 로드와 컴포넌트 연결만 하며, 처리 로직은 `knowledge` 모듈에 있습니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectionStats, CollectorConfig, FileCollector};
use crate::config::{EmbeddingProviderKind, RagConfig};
use crate::embedding::{create_embedder, has_api_key, EmbeddingProvider};
use crate::knowledge::{
    category_filter, count_by_category, validate_category, FilteredRetriever, IngestPipeline,
    IngestReport, QdrantIndex, VectorIndex,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "insurance-rag")]
#[command(version, about = "보험 약관 RAG 파이프라인", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 약관 XML 파일을 벡터 인덱스에 적재
    Ingest {
        /// 약관 XML 폴더
        #[arg(short, long, conflicts_with = "file")]
        dir: Option<PathBuf>,

        /// 약관 XML 파일 (여러 개 가능)
        #[arg(short, long, num_args = 1..)]
        file: Vec<PathBuf>,

        /// 하위 폴더까지 수집
        #[arg(short, long)]
        recursive: bool,

        /// 컬렉션을 비우고 새로 적재
        #[arg(long)]
        recreate: bool,
    },

    /// 약관 검색
    Query {
        /// 검색 질의
        query: String,

        /// 보험 유형 필터 (예: 화재보험)
        #[arg(short = 't', long)]
        category: Option<String>,

        /// 결과 개수 (기본: 설정의 top_k)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// 저장된 청크 수 (보험 유형별)
    Count {
        /// 보험 유형 (생략하면 전체 유형별 집계)
        #[arg(short = 't', long)]
        category: Option<String>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest {
            dir,
            file,
            recursive,
            recreate,
        } => cmd_ingest(&config, dir, file, recursive, recreate).await,
        Commands::Query {
            query,
            category,
            limit,
        } => cmd_query(&config, &query, category.as_deref(), limit).await,
        Commands::Count { category } => cmd_count(&config, category.as_deref()).await,
        Commands::Status => cmd_status(&config, cli.config.as_deref()).await,
    }
}

// ============================================================================
// Component Wiring
// ============================================================================

fn open_index(config: &RagConfig) -> Result<Arc<dyn VectorIndex>> {
    let index = QdrantIndex::new(&config.qdrant).context("Qdrant 클라이언트 생성 실패")?;
    tracing::debug!("Using Qdrant at {}", index.base_url());
    Ok(Arc::new(index))
}

fn open_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.embedding.provider == EmbeddingProviderKind::Gemini && !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    create_embedder(&config.embedding).context("임베딩 프로바이더 생성 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 적재 명령어 (ingest)
///
/// 폴더 또는 파일 목록의 약관을 청킹/임베딩하여 저장합니다.
async fn cmd_ingest(
    config: &RagConfig,
    dir: Option<PathBuf>,
    file: Vec<PathBuf>,
    recursive: bool,
    recreate: bool,
) -> Result<()> {
    let collector = FileCollector::new(CollectorConfig {
        recursive,
        ..Default::default()
    });

    // 파일 수집
    let files = if let Some(ref dir_path) = dir {
        collector
            .collect_directory(dir_path)
            .with_context(|| format!("폴더 수집 실패: {}", dir_path.display()))?
    } else if !file.is_empty() {
        let mut files = Vec::with_capacity(file.len());
        for path in &file {
            match collector
                .collect_file(path)
                .with_context(|| format!("파일 확인 실패: {}", path.display()))?
            {
                Some(f) => files.push(f),
                None => println!("[!] XML 파일이 아니므로 건너뜀: {}", path.display()),
            }
        }
        files
    } else {
        bail!("--dir 또는 --file 중 하나를 지정해야 합니다");
    };

    if files.is_empty() {
        println!("[!] 적재할 XML 파일이 없습니다.");
        return Ok(());
    }

    let stats = CollectionStats::from_files(&files);
    println!("[*] 적재 대상: {} 파일", stats.total_files);
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!("    컬렉션: {}", config.collection_name);
    if recreate {
        println!("[!] 기존 컬렉션을 삭제하고 새로 적재합니다.");
    }
    println!();

    let embedder = open_embedder(config)?;
    let index = open_index(config)?;
    let pipeline = IngestPipeline::new(config, embedder, index).context("파이프라인 생성 실패")?;

    let paths: Vec<PathBuf> = files.into_iter().map(|f| f.path).collect();
    let report = pipeline
        .ingest_all(&paths, recreate)
        .await
        .context("적재 중단")?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    for ingested in &report.ingested_files {
        println!("  {} ... {} 청크", ingested.name, ingested.chunks);
    }
    for failed in &report.failed_files {
        println!("  {} ... 실패: {}", failed.name, failed.reason);
    }

    println!();
    println!(
        "[OK] 완료: 청크 {}, 성공 {}, 실패 {} ({:.1}초)",
        report.total_chunks,
        report.ingested_files.len(),
        report.failed_files.len(),
        report.elapsed.as_secs_f64()
    );
}

/// 검색 명령어 (query)
///
/// 보험 유형 필터와 함께 시맨틱 검색을 수행합니다.
async fn cmd_query(
    config: &RagConfig,
    query: &str,
    category: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let embedder = open_embedder(config)?;
    let index = open_index(config)?;

    let mut retriever = FilteredRetriever::new(config, embedder, index);
    if let Some(limit) = limit {
        retriever = retriever.with_top_k(limit.max(1));
    }

    match category {
        Some(c) => println!("[*] 검색 중: \"{}\" (유형: {})", query, c.trim()),
        None => println!("[*] 검색 중: \"{}\"", query),
    }

    let results = retriever
        .retrieve(query, category)
        .await
        .context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] [점수: {:.4}] {}",
            i + 1,
            result.metadata.category,
            result.score,
            result.metadata.name
        );
        println!(
            "   출처: {} (청크 #{})",
            result.metadata.source_id, result.metadata.chunk_index
        );
        println!("   내용: {}", truncate_text(&result.text, 200));
        println!();
    }

    Ok(())
}

/// 집계 명령어 (count)
///
/// 유형을 지정하면 해당 유형만, 아니면 허용된 전체 유형별로 집계합니다.
async fn cmd_count(config: &RagConfig, category: Option<&str>) -> Result<()> {
    let index = open_index(config)?;

    if let Some(category) = category {
        let category = validate_category(&config.allowed_categories, category)?;
        let count = index
            .count(&config.collection_name, Some(&category_filter(category)))
            .await
            .context("집계 실패")?;
        println!("[OK] {}: {} 청크", category, count);
        return Ok(());
    }

    let counts = count_by_category(
        index.as_ref(),
        &config.collection_name,
        &config.allowed_categories,
    )
    .await
    .context("집계 실패")?;

    println!("[*] 컬렉션 {} 유형별 청크 수:\n", config.collection_name);
    for (category, count) in &counts.per_category {
        println!("  {:<8} {:>8}", category, count);
    }

    println!();
    println!("[OK] 전체: {} 청크", counts.total);
    if counts.uncategorized() > 0 {
        println!("[!] 허용 목록 밖의 유형: {} 청크", counts.uncategorized());
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 설정, API 키, Qdrant 컬렉션 상태를 확인합니다.
async fn cmd_status(config: &RagConfig, config_path: Option<&Path>) -> Result<()> {
    println!("insurance-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    match config_path {
        Some(path) => println!("[*] 설정 파일: {}", path.display()),
        None => println!("[*] 설정 파일: 기본 경로 (없으면 기본값)"),
    }

    // 임베딩 설정
    let embedding = &config.embedding;
    println!(
        "[*] 임베딩: {:?} / {} ({}차원)",
        embedding.provider, embedding.model, embedding.dimension
    );
    if embedding.provider == EmbeddingProviderKind::Gemini {
        if has_api_key() {
            println!("[OK] API 키: 설정됨");
        } else {
            println!("[!] API 키: 미설정");
            println!("    설정: export GEMINI_API_KEY=your-key");
        }
    }

    // Qdrant 상태
    let index = open_index(config)?;
    let base_url = config.qdrant.base_url().context("Qdrant 주소 오류")?;
    println!("[*] Qdrant: {}", base_url);

    match index.collection_info(&config.collection_name).await {
        Ok(Some(info)) => {
            println!(
                "[OK] 컬렉션 {}: {} 포인트, {}차원",
                config.collection_name, info.points_count, info.dimension
            );
            if info.dimension != embedding.dimension {
                println!(
                    "[!] 임베딩 차원({})이 컬렉션과 다릅니다. --recreate로 다시 적재하세요.",
                    embedding.dimension
                );
            }
        }
        Ok(None) => {
            println!("[!] 컬렉션 {} 없음 (ingest로 생성)", config.collection_name);
        }
        Err(e) => {
            println!("[!] Qdrant 조회 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingest_files() {
        let cli = Cli::parse_from([
            "insurance-rag",
            "--config",
            "rag.yaml",
            "ingest",
            "--file",
            "a.xml",
            "b.xml",
            "--recreate",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("rag.yaml")));
        match cli.command {
            Commands::Ingest {
                dir,
                file,
                recreate,
                ..
            } => {
                assert!(dir.is_none());
                assert_eq!(file.len(), 2);
                assert!(recreate);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_dir_conflicts_with_file() {
        let result =
            Cli::try_parse_from(["insurance-rag", "ingest", "--dir", "data", "--file", "a.xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_query_with_category() {
        let cli = Cli::parse_from(["insurance-rag", "query", "화재 보상 범위", "-t", "화재보험"]);
        match cli.command {
            Commands::Query {
                query, category, limit,
            } => {
                assert_eq!(query, "화재 보상 범위");
                assert_eq!(category.as_deref(), Some("화재보험"));
                assert!(limit.is_none());
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "제1조 보험금의 지급사유";
        assert_eq!(truncate_text(korean, 3), "제1조...");
    }
}
