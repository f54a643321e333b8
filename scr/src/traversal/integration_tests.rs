//! End-to-end crawl scenarios against the in-memory site.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::config::RunConfig;
    use crate::document::{Document, DocumentKind};
    use crate::chain::ChainSetBuilder;
    use crate::engine::{PromptKind, PromptResponse, QueryLanguage, XPathQueryEngine};
    use crate::errors::{FetchErrorKind, ScrError};
    use crate::events::{CollectingEventSink, EventKind};
    use crate::testing::{
        assert_clean_run, assert_event_count, assert_printed_lines, build_chains, site, site_page,
        CollectingOutputSink, FakeScriptEvaluator, ScriptedInteraction, StaticFetcher, LABELED_PAGE,
        LINK_PAGE, SITE_ROOT,
    };
    use crate::traversal::{Crawler, RunSummary};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct Harness {
        crawler: Crawler,
        output: CollectingOutputSink,
        events: Arc<CollectingEventSink>,
    }

    fn harness(args: &[&str], fetcher: StaticFetcher, config: RunConfig) -> Harness {
        let output = CollectingOutputSink::new();
        let events = Arc::new(CollectingEventSink::new());
        let config = config.with_query_language(QueryLanguage::Css);
        let crawler = Crawler::new(build_chains(args).unwrap(), config)
            .with_fetcher(Arc::new(fetcher))
            .with_output(Arc::new(output.clone()))
            .with_events(events.clone());
        Harness {
            crawler,
            output,
            events,
        }
    }

    fn root(consumers: &[usize]) -> Vec<Document> {
        vec![Document::initial(
            DocumentKind::Url,
            SITE_ROOT,
            consumers.iter().copied().collect(),
        )]
    }

    fn literal(text: &str, consumers: &[usize]) -> Vec<Document> {
        vec![Document::initial(
            DocumentKind::Str,
            text,
            consumers.iter().copied().collect(),
        )]
    }

    const CRAWL: &[&str] = &["cx=h1::text", "dx=a::attr(href)"];

    fn crawl_with(extra: &[&'static str]) -> Vec<&'static str> {
        CRAWL.iter().chain(extra).copied().collect()
    }

    async fn crawl(
        args: &[&str],
        fetcher: StaticFetcher,
        config: RunConfig,
    ) -> (RunSummary, CollectingOutputSink) {
        let h = harness(args, fetcher, config);
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        (summary, h.output)
    }

    #[tokio::test]
    async fn test_literal_document_prints_matches() {
        let h = harness(&["cx=li::text"], StaticFetcher::new(), RunConfig::default());
        let summary = h.crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&h.output, &["first", "two second", "third"]);
        assert_eq!(summary.contents_finalized, 3);
        assert_clean_run(&summary);
        assert_event_count(&h.events, EventKind::RunStarted, 1);
        assert_event_count(&h.events, EventKind::ContentFinalized, 3);
        assert_event_count(&h.events, EventKind::RunCompleted, 1);
    }

    #[tokio::test]
    async fn test_depth_first_crawl_fetches_each_page_once() {
        let fetcher = site();
        let (summary, output) = crawl(CRAWL, fetcher.clone(), RunConfig::default()).await;
        assert_printed_lines(&output, &["Index", "A", "C", "B"]);
        assert_eq!(summary.documents_fetched, 4);
        for page in ["index.html", "a.html", "b.html", "c.html"] {
            assert_eq!(fetcher.fetch_count(&site_page(page)), 1, "{page}");
        }
    }

    #[tokio::test]
    async fn test_breadth_first_crawl_finds_the_same_contents() {
        let (_, output) = crawl(CRAWL, site(), RunConfig::default().with_bfs(true)).await;
        assert_printed_lines(&output, &["Index", "A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_nonrecursive_allows_revisit_through_another_path() {
        let fetcher = site();
        let args = crawl_with(&["dd=nonrecursive"]);
        let (_, output) = crawl(&args, fetcher.clone(), RunConfig::default()).await;
        assert_printed_lines(&output, &["Index", "A", "C", "B", "C"]);
        assert_eq!(fetcher.fetch_count(SITE_ROOT), 1);
        assert_eq!(fetcher.fetch_count(&site_page("c.html")), 2);
    }

    #[tokio::test]
    async fn test_document_index_limit_stops_the_chain() {
        let args = crawl_with(&["dimax=2"]);
        let h = harness(&args, site(), RunConfig::default());
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        assert_printed_lines(&h.output, &["Index", "A"]);
        assert_eq!(summary.documents_fetched, 2);
        assert_event_count(&h.events, EventKind::ChainExhausted, 1);
    }

    #[tokio::test]
    async fn test_content_index_limit() {
        let h = harness(&["cx=li::text", "cimax=2", "cpf={ci}:{c}\\n"], StaticFetcher::new(), RunConfig::default());
        h.crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&h.output, &["1:first", "2:two second"]);
    }

    #[tokio::test]
    async fn test_content_index_resets_per_document() {
        let args = crawl_with(&["cpf={di}.{ci} {c}\\n"]);
        let (_, output) = crawl(&args, site(), RunConfig::default()).await;
        assert_printed_lines(&output, &["1.1 Index", "2.1 A", "3.1 C", "4.1 B"]);
    }

    #[tokio::test]
    async fn test_continuous_content_index() {
        let args = crawl_with(&["cicont", "cimax=3", "cpf={ci} {c}\\n"]);
        let (_, output) = crawl(&args, site(), RunConfig::default()).await;
        assert_printed_lines(&output, &["1 Index", "2 A", "3 C"]);
    }

    #[tokio::test]
    async fn test_discovered_fetch_failure_is_skipped() {
        let fetcher = site().with_failure(&site_page("b.html"), FetchErrorKind::Status(500));
        let h = harness(CRAWL, fetcher, RunConfig::default());
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        assert_printed_lines(&h.output, &["Index", "A", "C"]);
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.exit_code(), 1);
        let failed = h.events.events_of_kind(EventKind::FetchFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].location.as_deref(), Some(site_page("b.html").as_str()));
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_is_fatal() {
        let h = harness(CRAWL, StaticFetcher::new(), RunConfig::default());
        let err = h.crawler.run(root(&[0])).await.unwrap_err();
        assert!(matches!(err, ScrError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_rejected_content_consumes_its_index() {
        let interaction = ScriptedInteraction::new().then(PromptResponse::Reject);
        let h = harness(&["cx=li::text", "cin", "cpf={ci}:{c}\\n"], StaticFetcher::new(), RunConfig::default());
        let crawler = h.crawler.with_interaction(Arc::new(interaction.clone()));
        crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&h.output, &["2:two second", "3:third"]);
        assert_eq!(interaction.prompts().len(), 3);
        assert!(interaction.prompts()[0].multiline);
    }

    #[tokio::test]
    async fn test_edited_content_replaces_the_match() {
        let interaction = ScriptedInteraction::new().then(PromptResponse::Edit("edited".into()));
        let h = harness(&["cx=li::text", "cin", "cimax=2"], StaticFetcher::new(), RunConfig::default());
        let crawler = h.crawler.with_interaction(Arc::new(interaction));
        crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&h.output, &["edited", "two second"]);
    }

    #[tokio::test]
    async fn test_skip_chain_leaves_other_chains_running() {
        let interaction = ScriptedInteraction::new().then(PromptResponse::SkipChain);
        let h = harness(&["cx0=li::text", "cin0", "cx1=h1::text"], StaticFetcher::new(), RunConfig::default());
        let crawler = h.crawler.with_interaction(Arc::new(interaction.clone()));
        crawler.run(literal(LINK_PAGE, &[0, 1])).await.unwrap();
        assert_printed_lines(&h.output, &["Links"]);
        assert_eq!(interaction.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_document_stops_every_chain() {
        let interaction = ScriptedInteraction::new().then(PromptResponse::SkipDocument);
        let h = harness(&["cx0=li::text", "cin0", "cx1=h1::text"], StaticFetcher::new(), RunConfig::default());
        let crawler = h.crawler.with_interaction(Arc::new(interaction));
        crawler.run(literal(LINK_PAGE, &[0, 1])).await.unwrap();
        assert_eq!(h.output.printed(), "");
    }

    #[tokio::test]
    async fn test_abort_stops_the_run_cleanly() {
        let interaction = ScriptedInteraction::new().then(PromptResponse::Abort);
        let args = crawl_with(&["din"]);
        let h = harness(&args, site(), RunConfig::default());
        let crawler = h.crawler.with_interaction(Arc::new(interaction));
        let summary = crawler.run(root(&[0])).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.documents_fetched, 1);
        assert_printed_lines(&h.output, &["Index"]);
    }

    #[tokio::test]
    async fn test_rejected_document_is_not_visited() {
        let interaction = ScriptedInteraction::new().then(PromptResponse::Reject);
        let args = crawl_with(&["din"]);
        let h = harness(&args, site(), RunConfig::default());
        let crawler = h.crawler.with_interaction(Arc::new(interaction.clone()));
        crawler.run(root(&[0])).await.unwrap();
        // a.html is rejected, b.html leads to c.html
        assert_printed_lines(&h.output, &["Index", "B", "C"]);
        assert_eq!(interaction.prompts()[0].value, site_page("a.html"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("test");
        let h = harness(CRAWL, site(), RunConfig::default());
        let summary = h.crawler.with_cancellation(token).run(root(&[0])).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.documents_fetched, 0);
        assert_event_count(&h.events, EventKind::RunCompleted, 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_find_the_same_contents() {
        let fetcher = site();
        let config = RunConfig::default().with_max_fetch_workers(3);
        let (summary, output) = crawl(CRAWL, fetcher.clone(), config).await;
        let mut lines = output.printed_lines();
        lines.sort();
        assert_eq!(lines, vec!["A", "B", "C", "Index"]);
        assert_eq!(summary.documents_fetched, 4);
        assert_eq!(fetcher.fetch_count(&site_page("c.html")), 1);
    }

    #[tokio::test]
    async fn test_document_match_is_bound_in_content_scope() {
        let args = crawl_with(&["cpf={d}|{c}\\n"]);
        let (summary, output) = crawl(&args, site(), RunConfig::default()).await;
        // the initial document was not produced by a document match
        assert_eq!(summary.format_failures, 1);
        assert_printed_lines(&output, &["a.html|A", "c.html|C", "b.html|B"]);
    }

    #[tokio::test]
    async fn test_forwarded_content_becomes_documents() {
        let h = harness(&["cx0=.item", "cfc0=1", "cx1=h2::text"], StaticFetcher::new(), RunConfig::default());
        let summary = h.crawler.run(literal(LABELED_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&h.output, &["Alpha", "Beta"]);
        assert_eq!(summary.contents_forwarded, 3);
        assert_eq!(summary.contents_finalized, 5);
        assert_event_count(&h.events, EventKind::ContentForwarded, 3);
    }

    #[tokio::test]
    async fn test_labels_name_saved_files() {
        let h = harness(
            &["cx=.item p::text", "lx=.item h2::text", "csf={l}.txt"],
            StaticFetcher::new(),
            RunConfig::default(),
        );
        h.crawler.run(literal(LABELED_PAGE, &[0])).await.unwrap();
        assert_eq!(h.output.saved("Alpha.txt"), Some(b"one".to_vec()));
        assert_eq!(h.output.saved("Beta.txt"), Some(b"two".to_vec()));
        assert_eq!(h.output.saved_paths().len(), 2);
        assert_event_count(&h.events, EventKind::MatchSkipped, 1);
    }

    #[tokio::test]
    async fn test_default_label_format() {
        let h = harness(&["cx=li::text", "csf={l}.txt"], StaticFetcher::new(), RunConfig::default());
        h.crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_eq!(
            h.output.saved_paths(),
            vec![
                PathBuf::from("dl_001.txt"),
                PathBuf::from("dl_002.txt"),
                PathBuf::from("dl_003.txt")
            ]
        );
    }

    #[tokio::test]
    async fn test_labels_with_slashes_are_skipped() {
        let h = harness(
            &["cx=li::text", "lx=li::text", "lf={lx}/x", "csf={l}"],
            StaticFetcher::new(),
            RunConfig::default(),
        );
        h.crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert!(h.output.saved_paths().is_empty());
        assert_event_count(&h.events, EventKind::MatchSkipped, 3);
    }

    #[tokio::test]
    async fn test_existing_files_are_kept_without_overwrite() {
        let h = harness(&["cx=li::text", "csf=out.txt", "owf=no"], StaticFetcher::new(), RunConfig::default());
        let summary = h.crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_eq!(h.output.saved("out.txt"), Some(b"first".to_vec()));
        assert_eq!(summary.output_failures, 2);
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_content_links_are_fetched() {
        let fetcher = site();
        let h = harness(&["cx=a::attr(href)", "cl", "csf=out/{fn}"], fetcher.clone(), RunConfig::default());
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        assert_clean_run(&summary);
        let saved = h.output.saved("out/a.html").unwrap();
        assert!(String::from_utf8(saved).unwrap().contains("<h1>A</h1>"));
        assert!(h.output.saved("out/b.html").is_some());
        assert_eq!(fetcher.fetch_count(&site_page("a.html")), 1);
    }

    #[tokio::test]
    async fn test_content_links_are_not_fetched_when_unused() {
        let fetcher = site();
        let h = harness(&["cx=a::attr(href)", "cl", "cpf={cm}\\n"], fetcher.clone(), RunConfig::default());
        h.crawler.run(root(&[0])).await.unwrap();
        assert_printed_lines(&h.output, &["a.html", "b.html"]);
        assert_eq!(fetcher.fetch_count(&site_page("a.html")), 0);
    }

    #[tokio::test]
    async fn test_failed_content_link_skips_the_match() {
        let fetcher = site().with_failure(&site_page("a.html"), FetchErrorKind::Timeout);
        let h = harness(&["cx=a::attr(href)", "cl", "csf=out/{fn}"], fetcher, RunConfig::default());
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(h.output.saved_paths(), vec![PathBuf::from("out/b.html")]);
    }

    #[tokio::test]
    async fn test_shell_output_receives_content() {
        let h = harness(
            &["cx=h1::text", "cshf=wc -c", "cshif={c}"],
            StaticFetcher::new(),
            RunConfig::default(),
        );
        h.crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        let commands = h.output.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].command, "wc -c");
        assert_eq!(commands[0].stdin.as_deref(), Some(&b"Links"[..]));
        assert_eq!(h.output.printed(), "");
    }

    #[tokio::test]
    async fn test_script_stage_runs_in_the_crawl() {
        let evaluator = FakeScriptEvaluator::new().with_result("upper", &["LINKS"]);
        let h = harness(&["cx=h1::text", "cjs=upper"], StaticFetcher::new(), RunConfig::default());
        let crawler = h.crawler.with_script_evaluator(Arc::new(evaluator));
        crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&h.output, &["LINKS"]);
    }

    #[tokio::test]
    async fn test_document_without_interested_chain_is_skipped() {
        let fetcher = site();
        let args = ["cx0=h1::text", "dx0=a::attr(href)", "doc0=1", "cx1=h1::text", "dimax1=1"];
        let h = harness(&args, fetcher.clone(), RunConfig::default());
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        // chain 1 handles a.html and is then exhausted, b.html is never fetched
        assert_printed_lines(&h.output, &["Index", "A"]);
        assert_eq!(fetcher.fetch_count(&site_page("b.html")), 0);
        assert_eq!(summary.documents_fetched, 2);
        assert_eq!(summary.documents_skipped, 1);
    }

    #[tokio::test]
    async fn test_declared_encoding_decodes_document() {
        let fetcher = StaticFetcher::new()
            .with_document(SITE_ROOT, &b"<html><body><h1>caf\xe9</h1></body></html>"[..])
            .with_encoding(SITE_ROOT, "windows-1252");
        let h = harness(&["cx=h1::text", "cpf={c} {cenc}\\n"], fetcher, RunConfig::default());
        h.crawler.run(root(&[0])).await.unwrap();
        assert_printed_lines(&h.output, &["caf\u{e9} windows-1252"]);
    }

    #[tokio::test]
    async fn test_suggested_filename_wins_over_url() {
        let fetcher = site().with_filename(&site_page("a.html"), "alpha.htm");
        let h = harness(&["cx=a::attr(href)", "cl", "csf=out/{fn}"], fetcher, RunConfig::default());
        h.crawler.run(root(&[0])).await.unwrap();
        assert_eq!(
            h.output.saved_paths(),
            vec![PathBuf::from("out/alpha.htm"), PathBuf::from("out/b.html")]
        );
    }

    #[tokio::test]
    async fn test_failed_shell_command_is_counted() {
        let output = CollectingOutputSink::new().with_failing_commands();
        let config = RunConfig::default().with_query_language(QueryLanguage::Css);
        let crawler = Crawler::new(build_chains(&["cx=h1::text", "cshf=false"]).unwrap(), config)
            .with_fetcher(Arc::new(StaticFetcher::new()))
            .with_output(Arc::new(output.clone()));
        let summary = crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_eq!(summary.output_failures, 1);
        assert_eq!(summary.contents_finalized, 1);
        assert_eq!(output.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_content_index_stops_script_evaluation() {
        let evaluator = FakeScriptEvaluator::new();
        let h = harness(&["cx=li::text", "cjs=cx", "cimax=2"], StaticFetcher::new(), RunConfig::default());
        let crawler = h.crawler.with_script_evaluator(Arc::new(evaluator.clone()));
        crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&h.output, &["first", "two second"]);
        // the third item is never evaluated
        assert_eq!(evaluator.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_content_links_are_fetched_concurrently() {
        let delay = Duration::from_millis(300);
        let index = r#"<html><body><a href="p1.html">1</a><a href="p2.html">2</a><a href="p3.html">3</a></body></html>"#;
        let mut fetcher = StaticFetcher::new().with_document(SITE_ROOT, index);
        for name in ["p1.html", "p2.html", "p3.html"] {
            fetcher = fetcher
                .with_document(&site_page(name), format!("<p>{name}</p>"))
                .with_delay(&site_page(name), delay);
        }
        let config = RunConfig::default().with_max_fetch_workers(3);
        let h = harness(&["cx=a::attr(href)", "cl", "csf=out/{fn}"], fetcher, config);

        let started = Instant::now();
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        let elapsed = started.elapsed();

        assert_clean_run(&summary);
        assert_eq!(summary.contents_finalized, 3);
        let mut saved = h.output.saved_paths();
        saved.sort();
        assert_eq!(
            saved,
            vec![
                PathBuf::from("out/p1.html"),
                PathBuf::from("out/p2.html"),
                PathBuf::from("out/p3.html"),
            ]
        );
        assert!(elapsed < delay * 5 / 2, "content links fetched one by one: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_content_link_forwarded_after_deferred_fetch() {
        let args = ["cx0=a::attr(href)", "cl0", "cfc0=1", "cx1=h1::text"];
        let h = harness(&args, site(), RunConfig::default().with_max_fetch_workers(2));
        let summary = h.crawler.run(root(&[0])).await.unwrap();
        let mut lines = h.output.printed_lines();
        lines.sort();
        assert_eq!(lines, vec!["A", "B"]);
        assert_eq!(summary.contents_forwarded, 2);
    }

    #[tokio::test]
    async fn test_save_path_prompt_edits_the_path() {
        let interaction = ScriptedInteraction::new()
            .then(PromptResponse::Edit("out/renamed.txt".into()))
            .then(PromptResponse::Reject);
        let h = harness(
            &["cx=li::text", "cimax=2", "csf=out/{ci}.txt", "csin"],
            StaticFetcher::new(),
            RunConfig::default(),
        );
        let crawler = h.crawler.with_interaction(Arc::new(interaction.clone()));
        let summary = crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_eq!(h.output.saved_paths(), vec![PathBuf::from("out/renamed.txt")]);
        let prompts = interaction.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].kind, PromptKind::SavePath);
        assert_eq!(prompts[0].value, "out/1.txt");
        assert_eq!(summary.contents_finalized, 1);
    }

    #[tokio::test]
    async fn test_empty_save_path_is_not_written() {
        let h = harness(&["cx=h1::text", "csin"], StaticFetcher::new(), RunConfig::default());
        let summary = h.crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert!(h.output.saved_paths().is_empty());
        assert_eq!(summary.output_failures, 1);
    }

    #[tokio::test]
    async fn test_xpath_is_the_default_query_language() {
        let chains = ChainSetBuilder::from_args(&["cx=//li/text()", "cimax=2"])
            .unwrap()
            .build(&XPathQueryEngine::new(), false)
            .unwrap();
        let output = CollectingOutputSink::new();
        let crawler = Crawler::new(chains, RunConfig::default())
            .with_fetcher(Arc::new(StaticFetcher::new()))
            .with_output(Arc::new(output.clone()));
        crawler.run(literal(LINK_PAGE, &[0])).await.unwrap();
        assert_printed_lines(&output, &["first", " second"]);
    }

    #[tokio::test]
    async fn test_initial_document_decoded_per_chain() {
        let fetcher = StaticFetcher::new()
            .with_document(SITE_ROOT, &b"<html><body><h1>caf\xe9</h1></body></html>"[..]);
        let args = ["cx0=h1::text", "cx1=h1::text", "denc1=windows-1252"];
        let h = harness(&args, fetcher, RunConfig::default());
        h.crawler.run(root(&[0, 1])).await.unwrap();
        assert_printed_lines(&h.output, &["caf\u{fffd}", "caf\u{e9}"]);
    }
}
