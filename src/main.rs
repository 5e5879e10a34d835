mod analyzer;
mod cache;
mod classifier;
mod error;
mod metrics;
mod models;
mod normalizer;
mod redistributor;
mod scraper;
mod store;
mod telemetry;
mod trend;

use analyzer::{AdmissionAnalyzer, TableSource};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use metrics::{AdmissionPath, CoarseOutcome, Histogram, Kpis, OutcomeDistribution, TopScore};
use models::{career_slug, Config, Dataset, Edition};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use store::TableStore;
use tracing::{debug, info, warn};
use trend::TrendPoint;

fn cli() -> Command {
    Command::new("admission-stats")
        .version("0.1.0")
        .about("Admission-exam results: scrape, preprocess and per-career statistics")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("admission.toml"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("scrape").about("Download every configured edition into raw tables"),
        )
        .subcommand(
            Command::new("preprocess")
                .about("Normalize raw tables and route second-choice applicants"),
        )
        .subcommand(
            Command::new("list").about("List stored editions and careers").arg(
                Arg::new("edition")
                    .long("edition")
                    .value_name("YYYY-S")
                    .help("Only list careers of this edition"),
            ),
        )
        .subcommand(
            Command::new("report")
                .about("Statistics for one career in one edition")
                .arg(edition_arg())
                .arg(career_arg()),
        )
        .subcommand(
            Command::new("trend")
                .about("Admitted-score trend of one career across editions")
                .arg(career_arg()),
        )
}

fn edition_arg() -> Arg {
    Arg::new("edition")
        .long("edition")
        .value_name("YYYY-S")
        .required(true)
        .help("Admission edition, e.g. 2025-1")
}

fn career_arg() -> Arg {
    Arg::new("career")
        .long("career")
        .value_name("NAME")
        .required(true)
        .help("Career name or slug")
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("admission.toml");

    let config = if Path::new(config_file).exists() {
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        Config::default().save_to_file(config_file)?;
        println!("📝 Created default configuration file: {}", config_file);
        println!("⚠️  Review {} and run the command again.", config_file);
        return Ok(());
    };

    telemetry::init(config.log_level.as_deref().unwrap_or("info"))?;

    let store = TableStore::new(config.data_dir());
    match matches.subcommand() {
        Some(("scrape", _)) => run_scrape(&config, &store).await,
        Some(("preprocess", _)) => run_preprocess(&store).map(|_| ()),
        Some(("list", args)) => run_list(&store, args),
        Some(("report", args)) => {
            let edition = parse_edition(args)?;
            let career = required(args, "career")?;
            let mut analyzer = AdmissionAnalyzer::new(store);
            run_report(&mut analyzer, &config, edition, career)
        }
        Some(("trend", args)) => {
            let career = required(args, "career")?;
            let mut analyzer = AdmissionAnalyzer::new(store);
            run_trend(&mut analyzer, &config, career)
        }
        _ => Ok(()),
    }
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("Missing --{}", name))
}

fn parse_edition(args: &ArgMatches) -> Result<Edition> {
    Ok(required(args, "edition")?.parse()?)
}

async fn run_scrape(config: &Config, store: &TableStore) -> Result<()> {
    let scraper = scraper::AdmissionScraper::new()?;

    for url in &config.edition_urls {
        let scraped = match scraper.scrape_edition(url).await {
            Ok(scraped) => scraped,
            Err(err) => {
                warn!(url = %url, error = %err, "edition skipped");
                continue;
            }
        };
        for (career, rows) in &scraped.tables {
            store.write_raw(scraped.edition, career, rows)?;
        }
        if scraped.skipped_rows > 0 {
            warn!(edition = %scraped.edition, skipped = scraped.skipped_rows, "short rows skipped");
        }
        println!(
            "✅ {}: {} career tables saved",
            scraped.edition,
            scraped.tables.len()
        );
    }
    Ok(())
}

/// Rebuild every processed table from the raw ones.
fn run_preprocess(store: &TableStore) -> Result<Dataset> {
    let raw_tables = store.read_raw_dataset()?;
    if raw_tables.is_empty() {
        println!("❌ No raw tables found. Run `scrape` first.");
        return Ok(Dataset::new());
    }

    let mut dataset = Dataset::new();
    for raw in raw_tables {
        let table = normalizer::normalize_raw_table(raw);
        dataset.insert((table.edition, table.slug()), table);
    }
    info!(tables = dataset.len(), "raw tables normalized");

    let (routed, stats) = redistributor::redistribute(&dataset);
    let written = store.replace_processed(&routed)?;
    println!(
        "✅ {} tables written ({} second-choice rows routed, {} new tables)",
        written, stats.copied, stats.tables_created
    );
    Ok(routed)
}

fn run_list(store: &TableStore, args: &ArgMatches) -> Result<()> {
    let editions = match args.get_one::<String>("edition") {
        Some(edition) => vec![edition.parse::<Edition>()?],
        None => store.editions()?,
    };
    if editions.is_empty() {
        println!("ℹ️  No processed tables. Run `scrape` and `preprocess` first.");
    }
    for edition in editions {
        let careers = store.careers(edition)?;
        println!("{} ({} careers)", edition, careers.len());
        for career in careers {
            println!("   - {}", career);
        }
    }
    Ok(())
}

fn run_report<S: TableSource>(
    analyzer: &mut AdmissionAnalyzer<S>,
    config: &Config,
    edition: Edition,
    career: &str,
) -> Result<()> {
    let kpis = match analyzer.kpis(edition, career) {
        Ok(kpis) => kpis,
        Err(err) if err.is_not_found() => {
            println!("ℹ️  {}", err);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    if !analyzer.career_offered(edition, career)? {
        println!(
            "ℹ️  {} held no admission of its own in {}; only second-choice entrants are listed.",
            career, edition
        );
    }

    let distribution = analyzer.outcome_distribution(edition, career)?;
    let histograms = analyzer.score_histograms(
        edition,
        career,
        config.histogram_buckets_all,
        config.histogram_buckets_admitted,
    )?;
    let top = analyzer.top_scores(edition, career, config.top_n)?;
    let summary = analyzer.summary(edition, career)?;
    let table = analyzer.table(edition, career)?;
    let cache = analyzer.cache_stats();
    debug!(hits = cache.hits, misses = cache.misses, "analysis cache");

    let mut content = String::new();
    writeln!(content, "Admission report: {} ({})", table.career, edition)?;
    writeln!(content, "==========================================")?;
    if table.malformed_rows > 0 {
        writeln!(content, "Malformed rows skipped: {}", table.malformed_rows)?;
    }
    write_kpis(&mut content, &kpis, &distribution)?;
    if let Some(summary) = summary {
        writeln!(
            content,
            "Admitted scores (direct and second choice): {:.3} - {:.3}, mean {:.0}\n",
            summary.min_score, summary.max_score, summary.mean_score
        )?;
    }
    write_histogram(
        &mut content,
        "Scores, all applicants",
        &histograms.all_applicants,
        |l: CoarseOutcome| l.label(),
    )?;
    write_histogram(
        &mut content,
        "Scores, admitted",
        &histograms.admitted,
        |l: AdmissionPath| l.label(),
    )?;
    write_top_scores(&mut content, &top)?;
    print!("{}", content);

    let output_dir = Path::new(config.output_dir());
    fs::create_dir_all(output_dir)?;
    let stem = format!("{}-{}", edition, career_slug(career));
    fs::write(output_dir.join(format!("{}-report.txt", stem)), &content)?;
    generate_top_scores_csv(&top, &output_dir.join(format!("{}-top.csv", stem)))?;
    println!("\n📂 Report saved to {}", output_dir.display());
    Ok(())
}

fn run_trend<S: TableSource>(
    analyzer: &mut AdmissionAnalyzer<S>,
    config: &Config,
    career: &str,
) -> Result<()> {
    let series = analyzer.trend(career)?;
    if series.is_empty() {
        println!("ℹ️  No edition admitted anyone to {}", career);
        return Ok(());
    }

    println!("Admitted-score trend: {}", career);
    for point in &series {
        println!("   {}  {:<4}  {:.3}", point.edition, point.statistic, point.value);
    }

    let output_dir = Path::new(config.output_dir());
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}-trend.csv", career_slug(career)));
    generate_trend_csv(&series, &path)?;
    println!("\n📂 Trend saved to {}", path.display());
    Ok(())
}

fn fmt_score(score: Option<f64>) -> String {
    score
        .map(|s| format!("{:.3}", s))
        .unwrap_or_else(|| "-".to_string())
}

fn write_kpis(content: &mut String, kpis: &Kpis, distribution: &OutcomeDistribution) -> Result<()> {
    writeln!(content, "Applicants: {}", kpis.applicant_count)?;
    writeln!(content, "Highest score: {}", fmt_score(kpis.max_score))?;
    writeln!(content, "Mean admitted score: {}", fmt_score(kpis.mean_admitted_score))?;
    writeln!(content, "Cutoff score: {}", fmt_score(kpis.min_admitted_score))?;
    if kpis.unscored_admitted > 0 {
        writeln!(
            content,
            "Admitted without a score (not ranked): {}",
            kpis.unscored_admitted
        )?;
    }
    writeln!(
        content,
        "Admitted: {}  Rejected: {}  Absent: {}",
        distribution.admitted, distribution.rejected, distribution.absent
    )?;
    if let Some(rate) = distribution.admission_rate() {
        writeln!(content, "Admission rate: {:.2}%", rate * 100.0)?;
    }
    writeln!(content)?;
    Ok(())
}

fn write_histogram<L: Copy>(
    content: &mut String,
    title: &str,
    histogram: &Histogram<L>,
    label: impl Fn(L) -> &'static str,
) -> Result<()> {
    if histogram.is_empty() {
        writeln!(content, "{}", title)?;
        writeln!(content, "   (no scored applicants)\n")?;
        return Ok(());
    }
    writeln!(content, "{} ({} scored)", title, histogram.total())?;
    for bucket in histogram.buckets.iter().filter(|b| b.total() > 0) {
        let counts: Vec<String> = bucket
            .counts
            .iter()
            .map(|(l, count)| format!("{}={}", label(*l), count))
            .collect();
        writeln!(
            content,
            "   {:>9.3} - {:<9.3} {}",
            bucket.lower,
            bucket.upper,
            counts.join(", ")
        )?;
    }
    writeln!(content)?;
    Ok(())
}

fn write_top_scores(content: &mut String, top: &[TopScore]) -> Result<()> {
    writeln!(content, "Top admitted scores")?;
    if top.is_empty() {
        writeln!(content, "   (nobody admitted)")?;
    }
    for entry in top {
        writeln!(
            content,
            "   {:>2}. {:<10} {:.3}  {}",
            entry.rank,
            entry.id,
            entry.score,
            entry.outcome.label()
        )?;
    }
    Ok(())
}

fn generate_top_scores_csv(top: &[TopScore], path: &Path) -> Result<()> {
    let mut csv_writer = csv::Writer::from_path(path)?;
    csv_writer.write_record(["rank", "id", "score", "outcome"])?;
    for entry in top {
        csv_writer.write_record(&[
            entry.rank.to_string(),
            entry.id.clone(),
            format!("{:.3}", entry.score),
            entry.outcome.label().to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn generate_trend_csv(series: &[TrendPoint], path: &Path) -> Result<()> {
    let mut csv_writer = csv::Writer::from_path(path)?;
    csv_writer.write_record(["edition", "statistic", "value"])?;
    for point in series {
        csv_writer.write_record(&[
            point.edition.to_string(),
            point.statistic.to_string(),
            format!("{:.3}", point.value),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{RawApplicantRow, REMARK_ADMITTED, REMARK_ADMITTED_SECOND_CHOICE};

    fn raw_row(id: &str, career: &str, score: &str, remark: &str, second: &str) -> RawApplicantRow {
        RawApplicantRow {
            id: id.to_string(),
            full_name: Some(format!("APPLICANT {}", id)),
            career: career.to_string(),
            score: score.to_string(),
            slot: String::new(),
            remark: remark.to_string(),
            second_choice_career: second.to_string(),
        }
    }

    #[test]
    fn preprocess_then_query_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let edition = Edition::new(2025, 1);
        store
            .write_raw(
                edition,
                "Física",
                &[
                    raw_row("1", "Física", "1200.5", REMARK_ADMITTED, ""),
                    raw_row("5", "Física", "1100", REMARK_ADMITTED_SECOND_CHOICE, "Química"),
                ],
            )
            .unwrap();
        store
            .write_raw(edition, "Química", &[raw_row("9", "Química", "", "", "")])
            .unwrap();

        let first = run_preprocess(&store).unwrap();
        let second = run_preprocess(&store).unwrap();
        assert_eq!(first, second);

        let processed = fs::read_to_string(store.processed_path(edition, "Física")).unwrap();
        assert!(!processed.contains("APPLICANT"));

        let mut analyzer = AdmissionAnalyzer::new(store);
        let quimica = analyzer.outcome_distribution(edition, "quimica").unwrap();
        assert_eq!(quimica.admitted, 1);
        assert_eq!(quimica.rejected, 1);
        assert_eq!(analyzer.kpis(edition, "Química").unwrap().applicant_count, 1);
        assert_eq!(analyzer.kpis(edition, "Física").unwrap().applicant_count, 2);
    }

    #[test]
    fn cli_requires_a_subcommand() {
        assert!(cli().try_get_matches_from(["admission-stats"]).is_err());
        let args = ["admission-stats", "report", "--edition", "2025-1", "--career", "X"];
        let matches = cli().try_get_matches_from(args).unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "report");
        assert_eq!(parse_edition(args).unwrap(), Edition::new(2025, 1));
    }
}
