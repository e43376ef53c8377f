//! 테스트용 가짜 임베딩 프로바이더와 약관 XML 생성기

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 문자 분포 기반 결정적 임베딩 (네트워크 없음)
///
/// 모든 호출 횟수를 기록합니다.
pub struct CountingEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// embed / embed_batch / embed_query 호출 총합
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for c in text.chars() {
            vector[c as usize % self.dimension] += 1.0;
        }
        vector[0] += 1.0;
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// 항상 연결 실패를 내는 임베딩
pub struct UnreachableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnreachableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Connectivity("embedding server unreachable".to_string()))
    }

    fn dimension(&self) -> usize {
        8
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

/// 조항 `clauses`개짜리 약관 XML (조항당 청크 하나)
pub fn policy_xml(category: &str, name: &str, clauses: usize) -> String {
    let filler = "회사는 약관에 따라 보험금을 지급합니다. ".repeat(6);
    let body: String = (1..=clauses)
        .map(|i| format!("제{}조(보상) {}\n", i, filler))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root><file><category>{}</category><name>{}</name><cn>{}</cn></file></root>",
        category, name, body
    )
}

/// 디렉토리에 파일 쓰기
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
