use async_trait::async_trait;
use corpus_chunk_processor::{
    write_jsonl, ChunkOutcome, ChunkProcessor, ModelClient, ProcessorSettings, PromptTemplate,
};
use corpus_code_chunker::{CorpusOptions, CorpusScanner, GroupingMode, SourceUnit};
use pretty_assertions::assert_eq;
use std::fs;
use std::io::BufRead;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Answers with the number of lines in the prompt; refuses prompts that
/// mention `panic!`
#[derive(Default)]
struct LineCounter {
    calls: AtomicUsize,
}

#[async_trait]
impl ModelClient for LineCounter {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if prompt.contains("panic!") {
            anyhow::bail!("refusing to review panicking code");
        }
        Ok(format!("{} lines", prompt.lines().count()))
    }
}

fn corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(&src).unwrap();

    let functions: Vec<String> = (0..40)
        .map(|i| {
            format!(
                "pub fn step_{i}(input: u64) -> u64 {{\n    let scaled = input * {i};\n    scaled + {i}\n}}\n"
            )
        })
        .collect();
    fs::write(src.join("steps.rs"), functions.join("\n")).unwrap();
    fs::write(
        src.join("guard.rs"),
        "pub fn guard(ok: bool) {\n    if !ok {\n        panic!(\"guard failed\");\n    }\n}\n",
    )
    .unwrap();
    dir
}

fn processor(context_length: usize) -> ChunkProcessor {
    let settings = ProcessorSettings::default()
        .context_length(context_length)
        .prompt_overhead_tokens(20);
    let template = PromptTemplate::new("Review the following code:\n\n{code}\n").unwrap();
    ChunkProcessor::new(settings, template).unwrap()
}

fn load(dir: &TempDir) -> Vec<SourceUnit> {
    CorpusScanner::new(dir.path(), CorpusOptions::default())
        .unwrap()
        .load()
}

#[test]
fn every_chunk_becomes_a_prompt_within_budget() {
    let dir = corpus();
    let units = load(&dir);
    let processor = processor(400);
    let effective = processor.settings().effective_input_limit().unwrap();

    let chunks = processor.chunker().chunk_corpus(&units);
    let prompts = processor.prepare(&units).unwrap();
    assert_eq!(prompts.len(), chunks.len());
    assert!(prompts.len() > 2);

    for (prompt, chunk) in prompts.iter().zip(&chunks) {
        assert_eq!(prompt.chunk_id, chunk.id);
        assert!(chunk.estimated_tokens <= effective);
        assert_eq!(prompt.token_count, chunk.estimated_tokens + 20);
        assert_eq!(prompt.estimated_response_tokens, 80);
        assert!(prompt.prompt.starts_with("Review the following code:\n\n"));
        assert!(prompt.prompt.contains(&chunk.content));
    }
}

#[test]
fn estimate_reports_context_length() {
    let dir = corpus();
    let units = load(&dir);
    let estimate = processor(400).estimate(&units).unwrap();
    assert_eq!(estimate.files, 2);
    assert_eq!(estimate.model_context_length, 400);
    assert!(estimate.estimated_chunks >= 1);
    assert_eq!(
        estimate.total_tokens,
        estimate.estimated_input_tokens + estimate.estimated_response_tokens
    );
}

#[tokio::test]
async fn process_dispatches_and_exports_outcomes() {
    let dir = corpus();
    let units = load(&dir);
    let processor = processor(400);
    let client = Arc::new(LineCounter::default());

    let outcomes = processor.process(&units, client.clone()).await.unwrap();
    assert_eq!(client.calls.load(Ordering::SeqCst), outcomes.len());

    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].files, vec!["src/guard.rs".to_string()]);
    assert_eq!(
        failed[0].error.as_deref(),
        Some("refusing to review panicking code")
    );

    let ids: Vec<_> = outcomes.iter().map(|o| o.chunk_id.clone()).collect();
    let expected: Vec<_> = processor
        .prepare(&units)
        .unwrap()
        .into_iter()
        .map(|p| p.chunk_id)
        .collect();
    assert_eq!(ids, expected);

    let out = dir.path().join("outcomes.jsonl");
    write_jsonl(&outcomes, fs::File::create(&out).unwrap()).unwrap();
    let reader = std::io::BufReader::new(fs::File::open(&out).unwrap());
    let decoded: Vec<ChunkOutcome> = reader
        .lines()
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .collect();
    assert_eq!(decoded, outcomes);
}

#[test]
fn settings_without_room_for_code_are_rejected() {
    let settings = ProcessorSettings::default()
        .context_length(100)
        .prompt_overhead_tokens(200);
    let template = PromptTemplate::new("{code}").unwrap();
    assert!(ChunkProcessor::new(settings, template).is_err());
}

#[test]
fn template_larger_than_overhead_is_rejected() {
    let settings = ProcessorSettings::default().prompt_overhead_tokens(3);
    let template =
        PromptTemplate::new("Review the following code carefully and list every bug:\n{code}")
            .unwrap();
    assert!(ChunkProcessor::new(settings, template).is_err());
}

#[test]
fn directory_prompts_name_each_file() {
    let dir = TempDir::new().unwrap();
    let pkg = dir.path().join("pkg");
    fs::create_dir_all(&pkg).unwrap();
    fs::write(pkg.join("a.py"), "def a():\n    return 1\n").unwrap();
    fs::write(pkg.join("b.py"), "def b():\n    return 2\n").unwrap();

    let settings = ProcessorSettings::default()
        .context_length(400)
        .prompt_overhead_tokens(20)
        .grouping(GroupingMode::PerDirectory);
    let template = PromptTemplate::new("Review the following code:\n\n{code}\n").unwrap();
    let processor = ChunkProcessor::new(settings, template).unwrap();

    let units = load(&dir);
    let chunks = processor.chunker().chunk_corpus(&units);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "def a():\n    return 1\ndef b():\n    return 2\n");

    let prompts = processor.prepare(&units).unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(
        prompts[0].prompt,
        "Review the following code:\n\n\
         # FILE: pkg/a.py\ndef a():\n    return 1\n\
         # FILE: pkg/b.py\ndef b():\n    return 2\n\n"
    );
    assert!(prompts[0].token_count > chunks[0].estimated_tokens + 20);
}
