use tracing::info;

use super::{stream_step, ChunkSink, PipelineError, Step};
use crate::catalog::{AgentPrompt, PromptCatalog, PromptKind};
use crate::llm::ChatBackend;
use crate::state::RunConfig;

pub const ANALYZER_COUNT: usize = 3;

/// Name of the downloadable consensus file.
pub const SUMMARY_FILE_NAME: &str = "resume_rapport.txt";

/// Prompts chosen for one summarization run.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub analyzers: [&'a AgentPrompt; ANALYZER_COUNT],
    pub consensus: &'a AgentPrompt,
}

impl<'a> Selection<'a> {
    /// Resolve slot selections by name. An empty slot takes the first
    /// prompt of its list.
    pub fn resolve(
        catalog: &'a PromptCatalog,
        analyzers: [Option<&str>; ANALYZER_COUNT],
        consensus: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let pick = |kind: PromptKind, name: Option<&str>| {
            catalog.select(kind, name).ok_or_else(|| match name {
                Some(name) => PipelineError::UnknownPrompt {
                    kind,
                    name: name.to_string(),
                },
                None => PipelineError::NoPrompts(kind),
            })
        };

        let [a, b, c] = analyzers;
        Ok(Self {
            analyzers: [
                pick(PromptKind::Agent, a)?,
                pick(PromptKind::Agent, b)?,
                pick(PromptKind::Agent, c)?,
            ],
            consensus: pick(PromptKind::Consensus, consensus)?,
        })
    }
}

/// Outputs of a completed run, analyses in slot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub analyses: Vec<String>,
    pub consensus: String,
}

pub fn analyzer_prompt(agent: &AgentPrompt, report: &str) -> String {
    format!("{}\n\n{}", agent.prompt, report)
}

/// Label and join analyzer outputs in slot order, each preceded by a blank
/// line and a 1-based heading.
pub fn combine_analyses(analyses: &[String]) -> String {
    analyses
        .iter()
        .enumerate()
        .fold(String::new(), |mut acc, (i, analysis)| {
            acc.push_str(&format!("\n\nRésumé {} :\n", i + 1));
            acc.push_str(analysis);
            acc
        })
}

pub fn consensus_prompt(consensus: &AgentPrompt, analyses: &[String]) -> String {
    format!("{}{}", consensus.prompt, combine_analyses(analyses))
}

/// Fan the report out to the three analyzers, then merge their outputs with
/// the consensus prompt. The consensus call starts only once every analyzer
/// stream has been drained.
pub async fn summarize<B: ChatBackend, S: ChunkSink>(
    backend: &B,
    selection: &Selection<'_>,
    report: &str,
    analyzer_sinks: &mut [S; ANALYZER_COUNT],
    consensus_sink: &mut S,
    config: &RunConfig,
) -> Result<Summary, PipelineError> {
    let limit = config.call_timeout();
    let prompts: Vec<String> = selection
        .analyzers
        .iter()
        .map(|agent| analyzer_prompt(agent, report))
        .collect();
    let [sink_1, sink_2, sink_3] = analyzer_sinks;

    let analyses = if config.parallel_analyzers {
        let (a, b, c) = futures::try_join!(
            stream_step(backend, Step::Analyzer(1), &prompts[0], sink_1, limit),
            stream_step(backend, Step::Analyzer(2), &prompts[1], sink_2, limit),
            stream_step(backend, Step::Analyzer(3), &prompts[2], sink_3, limit),
        )?;
        vec![a, b, c]
    } else {
        let mut analyses = Vec::with_capacity(ANALYZER_COUNT);
        for (i, (prompt, sink)) in prompts.iter().zip([sink_1, sink_2, sink_3]).enumerate() {
            analyses.push(stream_step(backend, Step::Analyzer(i + 1), prompt, sink, limit).await?);
        }
        analyses
    };

    info!(
        lengths = ?analyses.iter().map(String::len).collect::<Vec<_>>(),
        parallel = config.parallel_analyzers,
        "Analyzer outputs collected"
    );

    let prompt = consensus_prompt(selection.consensus, &analyses);
    let consensus = stream_step(backend, Step::Consensus, &prompt, consensus_sink, limit).await?;

    info!(consensus_len = consensus.len(), "Consensus complete");
    Ok(Summary {
        analyses,
        consensus,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{FakeBackend, RecordingSink};
    use std::time::Duration;

    fn prompt(name: &str, text: &str) -> AgentPrompt {
        AgentPrompt {
            name: name.to_string(),
            prompt: text.to_string(),
        }
    }

    fn catalog() -> PromptCatalog {
        PromptCatalog {
            agents: vec![
                prompt("Factuel", "Résume les faits."),
                prompt("Acteurs", "Liste les acteurs."),
                prompt("Chrono", "Donne la chronologie."),
            ],
            consensus: vec![prompt("Fusion", "Fusionne ces résumés.")],
        }
    }

    /// Analyzers echo their prompt's first line; the consensus call returns
    /// a fixed text.
    fn backend() -> FakeBackend {
        FakeBackend::new(|prompt| {
            if prompt.starts_with("Fusionne") {
                Ok("Synthèse finale".to_string())
            } else {
                Ok(format!("vu: {}", prompt.lines().next().unwrap_or_default()))
            }
        })
    }

    fn sinks() -> [RecordingSink; ANALYZER_COUNT] {
        Default::default()
    }

    #[test]
    fn test_resolve_by_name_and_default() {
        let catalog = catalog();
        let selection =
            Selection::resolve(&catalog, [Some("Chrono"), None, Some("Acteurs")], None).unwrap();
        assert_eq!(selection.analyzers[0].name, "Chrono");
        assert_eq!(selection.analyzers[1].name, "Factuel");
        assert_eq!(selection.analyzers[2].name, "Acteurs");
        assert_eq!(selection.consensus.name, "Fusion");
    }

    #[test]
    fn test_resolve_unknown_and_empty() {
        let catalog = catalog();
        let err = Selection::resolve(&catalog, [None, None, None], Some("Absent")).unwrap_err();
        assert_eq!(err.to_string(), "no consensus prompt named 'Absent'");

        let empty = PromptCatalog::default();
        let err = Selection::resolve(&empty, [None, None, None], None).unwrap_err();
        assert!(matches!(err, PipelineError::NoPrompts(PromptKind::Agent)));
    }

    #[test]
    fn test_analyzer_prompt_separator() {
        let agent = prompt("Factuel", "Résume les faits.");
        assert_eq!(
            analyzer_prompt(&agent, "Rapport du jour."),
            "Résume les faits.\n\nRapport du jour."
        );
    }

    #[test]
    fn test_consensus_prompt_keeps_slot_order() {
        let consensus = prompt("Fusion", "Fusionne ces résumés.");
        let analyses = vec!["un".to_string(), "deux".to_string(), "trois".to_string()];
        assert_eq!(
            consensus_prompt(&consensus, &analyses),
            "Fusionne ces résumés.\n\nRésumé 1 :\nun\n\nRésumé 2 :\ndeux\n\nRésumé 3 :\ntrois"
        );
    }

    async fn run_sequential() -> (Summary, FakeBackend, [RecordingSink; 3], RecordingSink) {
        let catalog = catalog();
        let selection = Selection::resolve(
            &catalog,
            [Some("Factuel"), Some("Acteurs"), Some("Chrono")],
            None,
        )
        .unwrap();
        let backend = backend();
        let mut analyzer_sinks = sinks();
        let mut consensus_sink = RecordingSink::default();
        let summary = summarize(
            &backend,
            &selection,
            "Rapport.",
            &mut analyzer_sinks,
            &mut consensus_sink,
            &RunConfig::default(),
        )
        .await
        .unwrap();
        (summary, backend, analyzer_sinks, consensus_sink)
    }

    #[tokio::test]
    async fn test_summarize_sequential() {
        let (summary, backend, analyzer_sinks, consensus_sink) = run_sequential().await;

        assert_eq!(
            summary.analyses,
            vec![
                "vu: Résume les faits.",
                "vu: Liste les acteurs.",
                "vu: Donne la chronologie.",
            ]
        );
        assert_eq!(summary.consensus, "Synthèse finale");

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 4);
        assert_eq!(prompts[0], "Résume les faits.\n\nRapport.");
        assert_eq!(
            prompts[3],
            "Fusionne ces résumés.\
             \n\nRésumé 1 :\nvu: Résume les faits.\
             \n\nRésumé 2 :\nvu: Liste les acteurs.\
             \n\nRésumé 3 :\nvu: Donne la chronologie."
        );

        assert_eq!(analyzer_sinks[1].chunks.concat(), "vu: Liste les acteurs.");
        assert!(analyzer_sinks.iter().all(|s| s.ended));
        assert_eq!(consensus_sink.chunks.concat(), "Synthèse finale");
    }

    #[tokio::test]
    async fn test_summarize_parallel_keeps_order() {
        let catalog = catalog();
        let selection = Selection::resolve(
            &catalog,
            [Some("Factuel"), Some("Acteurs"), Some("Chrono")],
            None,
        )
        .unwrap();
        // Slot 1 finishes last.
        let backend = backend().delayed(|prompt| {
            prompt
                .starts_with("Résume")
                .then(|| Duration::from_millis(50))
        });
        let mut analyzer_sinks = sinks();
        let mut consensus_sink = RecordingSink::default();
        let config = RunConfig {
            parallel_analyzers: true,
            ..RunConfig::default()
        };

        let summary = summarize(
            &backend,
            &selection,
            "Rapport.",
            &mut analyzer_sinks,
            &mut consensus_sink,
            &config,
        )
        .await
        .unwrap();

        let answered = backend.answered.lock().unwrap().clone();
        assert_eq!(answered.len(), 4);
        assert!(answered[2].starts_with("Résume les faits."));

        assert_eq!(summary.analyses[0], "vu: Résume les faits.");
        let prompts = backend.prompts();
        assert_eq!(
            prompts[3],
            "Fusionne ces résumés.\
             \n\nRésumé 1 :\nvu: Résume les faits.\
             \n\nRésumé 2 :\nvu: Liste les acteurs.\
             \n\nRésumé 3 :\nvu: Donne la chronologie."
        );
    }

    #[tokio::test]
    async fn test_summarize_aborts_on_analyzer_failure() {
        let catalog = catalog();
        let selection = Selection::resolve(&catalog, [None, Some("Acteurs"), None], None).unwrap();
        let backend = FakeBackend::new(|prompt| {
            if prompt.starts_with("Liste") {
                Err(anyhow::anyhow!("rate limited"))
            } else {
                Ok("ok".to_string())
            }
        });
        let mut analyzer_sinks = sinks();
        let mut consensus_sink = RecordingSink::default();

        let err = summarize(
            &backend,
            &selection,
            "Rapport.",
            &mut analyzer_sinks,
            &mut consensus_sink,
            &RunConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Completion {
                step: Step::Analyzer(2),
                ..
            }
        ));
        // Analyzer 3 and the consensus call never ran.
        assert_eq!(backend.prompts().len(), 2);
        assert!(consensus_sink.chunks.is_empty());
    }
}
