//! cinedex - browse TMDB movies, TV shows, and people from the command line.

/// Shared command context.
mod app;
/// Application configuration (TOML).
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cinedex_api::tmdb::{MovieSummary, PersonSummary, TmdbApi, TmdbClient, TvShowSummary};
use cinedex_core::{
    ContentFamily, CursorStore, DetailsRepository, EntityCache, MovieCategory, MovieRepository,
    Page, PeopleCategory, PeopleRepository, Repository, SearchCategory, SearchFilter,
    SearchRepository, SqliteStore, Theme, TvCategory, TvShowRepository, normalize_language_tag,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::App;

/// How long `language set` waits for cached data to be dropped.
const INVALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// CLI argument parser.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Override config/data directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List movies of a category.
    Movies(ListArgs<MovieListArg>),
    /// List TV shows of a category.
    Tv(ListArgs<TvListArg>),
    /// List popular people.
    People(ListArgs<PeopleListArg>),
    /// Search movies, TV shows, and people.
    Search(SearchArgs),
    /// Show details of a single movie, TV show, or person.
    Details(DetailsCommand),
    /// Show or change the content language.
    Language(LanguageCommand),
    /// Show or change the UI theme.
    Theme(ThemeCommand),
    /// Local cache operations.
    Cache(CacheCommand),
}

/// Arguments shared by the listing subcommands.
#[derive(clap::Args)]
struct ListArgs<C: ValueEnum + Clone + Send + Sync + 'static> {
    /// Category to list.
    #[arg(long, value_enum)]
    category: Option<C>,

    /// Load pages 1 through N.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    page: u32,

    /// Drop the cached category and fetch it again.
    #[arg(long)]
    refresh: bool,
}

/// Movie categories accepted on the command line.
#[derive(Clone, Copy, Default, ValueEnum)]
enum MovieListArg {
    #[default]
    Popular,
    TopRated,
    NowPlaying,
    Upcoming,
}

impl From<MovieListArg> for MovieCategory {
    fn from(arg: MovieListArg) -> Self {
        match arg {
            MovieListArg::Popular => Self::Popular,
            MovieListArg::TopRated => Self::TopRated,
            MovieListArg::NowPlaying => Self::NowPlaying,
            MovieListArg::Upcoming => Self::Upcoming,
        }
    }
}

/// TV categories accepted on the command line.
#[derive(Clone, Copy, Default, ValueEnum)]
enum TvListArg {
    #[default]
    Popular,
    TopRated,
    OnTheAir,
    AiringToday,
}

impl From<TvListArg> for TvCategory {
    fn from(arg: TvListArg) -> Self {
        match arg {
            TvListArg::Popular => Self::Popular,
            TvListArg::TopRated => Self::TopRated,
            TvListArg::OnTheAir => Self::OnTheAir,
            TvListArg::AiringToday => Self::AiringToday,
        }
    }
}

/// People categories accepted on the command line.
#[derive(Clone, Copy, Default, ValueEnum)]
enum PeopleListArg {
    #[default]
    Popular,
}

impl From<PeopleListArg> for PeopleCategory {
    fn from(arg: PeopleListArg) -> Self {
        match arg {
            PeopleListArg::Popular => Self::Popular,
        }
    }
}

/// Arguments for the `search` subcommand.
#[derive(clap::Args)]
struct SearchArgs {
    /// Search query.
    #[arg(long)]
    query: String,

    /// Restrict results to one media type.
    #[arg(long, value_enum, default_value_t = SearchFilterArg::All)]
    filter: SearchFilterArg,

    /// Load pages 1 through N.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    page: u32,
}

/// Search filters accepted on the command line.
#[derive(Clone, Copy, ValueEnum)]
enum SearchFilterArg {
    All,
    Movies,
    Tv,
    People,
}

impl From<SearchFilterArg> for SearchFilter {
    fn from(arg: SearchFilterArg) -> Self {
        match arg {
            SearchFilterArg::All => Self::All,
            SearchFilterArg::Movies => Self::Movies,
            SearchFilterArg::Tv => Self::Tv,
            SearchFilterArg::People => Self::People,
        }
    }
}

/// Arguments for the `details` subcommand.
#[derive(clap::Args)]
struct DetailsCommand {
    /// Details subcommand to run.
    #[command(subcommand)]
    command: DetailsSubcommands,
}

/// Available details subcommands.
#[derive(Subcommand)]
enum DetailsSubcommands {
    /// Movie details.
    Movie(IdArgs),
    /// TV show details.
    Tv(IdArgs),
    /// Person details.
    Person(IdArgs),
}

/// A TMDB ID argument.
#[derive(clap::Args)]
struct IdArgs {
    /// TMDB ID.
    #[arg(long)]
    id: u64,
}

/// Arguments for the `language` subcommand.
#[derive(clap::Args)]
struct LanguageCommand {
    /// Language subcommand to run.
    #[command(subcommand)]
    command: LanguageSubcommands,
}

/// Available language subcommands.
#[derive(Subcommand)]
enum LanguageSubcommands {
    /// Print the effective content language.
    Get,
    /// Choose a content language (e.g. `fr`, `pt-BR`).
    Set {
        /// BCP 47 language tag.
        tag: String,
    },
    /// Forget the chosen language and follow the platform locale.
    Unset,
}

/// Arguments for the `theme` subcommand.
#[derive(clap::Args)]
struct ThemeCommand {
    /// Theme subcommand to run.
    #[command(subcommand)]
    command: ThemeSubcommands,
}

/// Available theme subcommands.
#[derive(Subcommand)]
enum ThemeSubcommands {
    /// Print the current theme.
    Get,
    /// Choose a theme (`system`, `light`, or `dark`).
    Set {
        /// Theme name.
        theme: Theme,
    },
}

/// Arguments for the `cache` subcommand.
#[derive(clap::Args)]
struct CacheCommand {
    /// Cache subcommand to run.
    #[command(subcommand)]
    command: CacheSubcommands,
}

/// Available cache subcommands.
#[derive(Subcommand)]
enum CacheSubcommands {
    /// Drop every cached page and pagination cursor.
    Clear,
}

/// Loads pages `1..=last` of a category, stopping at the last page.
///
/// # Errors
///
/// Returns the first repository error.
async fn load_pages<F, A>(
    repo: &Repository<F, A, SqliteStore>,
    category: &F::Category,
    last: u32,
    refresh: bool,
) -> Result<Page<F::Item>>
where
    F: ContentFamily,
    A: TmdbApi + Send + Sync + 'static,
{
    let mut page = if refresh {
        repo.refresh(category).await?
    } else {
        repo.load_page(category, 1).await?
    };
    while page.page < last && page.has_more() {
        page = repo.load_page(category, page.page.saturating_add(1)).await?;
    }
    tracing::debug!(
        page = page.page,
        total_pages = page.total_pages,
        origin = ?page.origin,
        items = page.items.len(),
        "pages loaded"
    );
    Ok(page)
}

/// Opens the store and client needed by the listing commands.
fn listing_context(app: &App) -> Result<(Arc<TmdbClient>, Arc<SqliteStore>)> {
    let client = app.tmdb_client()?;
    let store = app.open_store()?;
    Ok((client, store))
}

/// Logs the trailing page summary line.
fn log_page_footer<T>(page: &Page<T>) {
    tracing::info!(
        "page {}/{} ({} items)",
        page.page,
        page.total_pages,
        page.items.len()
    );
}

/// Runs the `movies` subcommand.
///
/// # Errors
///
/// Returns an error if the client or database cannot be opened, or a page
/// fails to load.
#[instrument(skip_all)]
async fn run_movies(args: &ListArgs<MovieListArg>, dir: Option<&PathBuf>) -> Result<()> {
    let app = App::load(dir)?;
    let (client, store) = listing_context(&app)?;
    let repo = MovieRepository::new(client, store, app.provider.clone(), &app.coordinator);
    let category = MovieCategory::from(args.category.unwrap_or_default());

    let page = load_pages(&repo, &category, args.page, args.refresh).await?;
    for movie in &page.items {
        log_movie(movie);
    }
    log_page_footer(&page);
    Ok(())
}

/// Runs the `tv` subcommand.
///
/// # Errors
///
/// Returns an error if the client or database cannot be opened, or a page
/// fails to load.
#[instrument(skip_all)]
async fn run_tv(args: &ListArgs<TvListArg>, dir: Option<&PathBuf>) -> Result<()> {
    let app = App::load(dir)?;
    let (client, store) = listing_context(&app)?;
    let repo = TvShowRepository::new(client, store, app.provider.clone(), &app.coordinator);
    let category = TvCategory::from(args.category.unwrap_or_default());

    let page = load_pages(&repo, &category, args.page, args.refresh).await?;
    for show in &page.items {
        log_tv_show(show);
    }
    log_page_footer(&page);
    Ok(())
}

/// Runs the `people` subcommand.
///
/// # Errors
///
/// Returns an error if the client or database cannot be opened, or a page
/// fails to load.
#[instrument(skip_all)]
async fn run_people(args: &ListArgs<PeopleListArg>, dir: Option<&PathBuf>) -> Result<()> {
    let app = App::load(dir)?;
    let (client, store) = listing_context(&app)?;
    let repo = PeopleRepository::new(client, store, app.provider.clone(), &app.coordinator);
    let category = PeopleCategory::from(args.category.unwrap_or_default());

    let page = load_pages(&repo, &category, args.page, args.refresh).await?;
    for person in &page.items {
        log_person(person);
    }
    log_page_footer(&page);
    Ok(())
}

/// Runs the `search` subcommand.
///
/// # Errors
///
/// Returns an error if the query is blank, the client or database cannot
/// be opened, or a page fails to load.
#[instrument(skip_all)]
async fn run_search(args: &SearchArgs, dir: Option<&PathBuf>) -> Result<()> {
    let category = SearchCategory::new(SearchFilter::from(args.filter), &args.query);
    if category.query().is_empty() {
        bail!("search query must not be empty");
    }

    let app = App::load(dir)?;
    let (client, store) = listing_context(&app)?;
    let repo = SearchRepository::new(client, store, app.provider.clone(), &app.coordinator);

    let page = load_pages(&repo, &category, args.page, false).await?;
    for item in &page.items {
        tracing::info!("{}\t{}\t{}", item.media_type(), item.id(), item.title());
    }
    log_page_footer(&page);
    Ok(())
}

fn log_movie(movie: &MovieSummary) {
    tracing::info!(
        "{}\t{}\t{}\t{:.1}",
        movie.id,
        movie.title,
        movie.release_date.as_deref().unwrap_or("-"),
        movie.vote_average
    );
}

fn log_tv_show(show: &TvShowSummary) {
    tracing::info!(
        "{}\t{}\t{}\t{:.1}",
        show.id,
        show.name,
        show.first_air_date.as_deref().unwrap_or("-"),
        show.vote_average
    );
}

fn log_person(person: &PersonSummary) {
    tracing::info!(
        "{}\t{}\t{}",
        person.id,
        person.name,
        person.known_for_department.as_deref().unwrap_or("-")
    );
}

/// Runs the `details` subcommands.
///
/// # Errors
///
/// Returns an error if the TMDB client fails to build or the lookup fails.
#[instrument(skip_all)]
async fn run_details(command: &DetailsSubcommands, dir: Option<&PathBuf>) -> Result<()> {
    let app = App::load(dir)?;
    let details = DetailsRepository::new(app.tmdb_client()?, app.provider.clone());

    match command {
        DetailsSubcommands::Movie(args) => {
            let movie = details.movie(args.id).await?;
            let genres: Vec<&str> = movie.genres.iter().map(|g| g.name.as_str()).collect();
            tracing::info!("ID: {}", movie.id);
            tracing::info!("Title: {}", movie.title);
            tracing::info!("Release date: {}", movie.release_date.as_deref().unwrap_or("-"));
            tracing::info!(
                "Runtime: {}",
                movie
                    .runtime
                    .map_or_else(|| String::from("-"), |m| format!("{m} min"))
            );
            tracing::info!("Genres: {}", genres.join(", "));
            tracing::info!("Overview: {}", movie.overview.as_deref().unwrap_or("-"));
        }
        DetailsSubcommands::Tv(args) => {
            let show = details.tv_show(args.id).await?;
            tracing::info!("ID: {}", show.id);
            tracing::info!("Name: {}", show.name);
            tracing::info!("First aired: {}", show.first_air_date.as_deref().unwrap_or("-"));
            tracing::info!(
                "Seasons: {} ({} episodes)",
                show.number_of_seasons,
                show.number_of_episodes
            );
            tracing::info!("Status: {}", show.status.as_deref().unwrap_or("-"));
            tracing::info!("Overview: {}", show.overview.as_deref().unwrap_or("-"));
        }
        DetailsSubcommands::Person(args) => {
            let person = details.person(args.id).await?;
            tracing::info!("ID: {}", person.id);
            tracing::info!("Name: {}", person.name);
            tracing::info!("Born: {}", person.birthday.as_deref().unwrap_or("-"));
            tracing::info!(
                "Place of birth: {}",
                person.place_of_birth.as_deref().unwrap_or("-")
            );
            tracing::info!(
                "Known for: {}",
                person.known_for_department.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

/// Runs the `language get` subcommand.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded.
fn run_language_get(dir: Option<&PathBuf>) -> Result<()> {
    let app = App::load(dir)?;
    let chosen = app.settings.language();
    tracing::info!(
        "{}\t{}",
        app.provider.current(),
        chosen.as_deref().map_or("platform", |_| "chosen")
    );
    Ok(())
}

/// Runs `language set` and `language unset`.
///
/// When the effective language changes, the local cache is dropped before
/// the new preference is saved.
///
/// # Errors
///
/// Returns an error if the tag is invalid, the database cannot be opened,
/// the cache cannot be dropped in time, or the config cannot be written.
#[instrument(skip_all)]
async fn run_language_set(tag: Option<&str>, dir: Option<&PathBuf>) -> Result<()> {
    let normalized = tag
        .map(|t| normalize_language_tag(t).with_context(|| format!("invalid language tag: {t}")))
        .transpose()?;

    let mut app = App::load(dir)?;
    let store = app.open_store()?;
    let _registration = app.coordinator.register(&store);
    let mut applied = app.coordinator.applied();
    let task = app.coordinator.start(&app.provider);

    let previous = app.provider.current();
    app.settings.set_language(normalized.as_deref());
    let current = app.provider.current();

    if previous != current {
        let waited = tokio::time::timeout(
            INVALIDATION_TIMEOUT,
            applied.wait_for(|v| v.as_deref() == Some(current.as_str())),
        )
        .await;
        task.abort();
        waited
            .context("timed out waiting for the cache to be dropped")?
            .context("language coordinator stopped")?;
    } else {
        task.abort();
    }

    app.persist()?;
    tracing::info!("{current}");
    Ok(())
}

/// Runs the `theme` subcommands.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or written.
fn run_theme(command: &ThemeSubcommands, dir: Option<&PathBuf>) -> Result<()> {
    let mut app = App::load(dir)?;
    match command {
        ThemeSubcommands::Get => {}
        ThemeSubcommands::Set { theme } => {
            if app.settings.set_theme(*theme) {
                app.persist()?;
            }
        }
    }
    tracing::info!("{}", app.settings.theme());
    Ok(())
}

/// Runs the `cache clear` subcommand.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or cleared.
#[instrument(skip_all)]
async fn run_cache_clear(dir: Option<&PathBuf>) -> Result<()> {
    let app = App::load(dir)?;
    let store = app.open_store()?;
    let entities = store.clear_all().await?;
    let cursors = store.reset_all().await?;
    tracing::info!("Cleared {entities} cached items and {cursors} cursors");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_simple_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    let dir = cli.dir.as_ref();
    match cli.command {
        Commands::Movies(args) => run_movies(&args, dir).await,
        Commands::Tv(args) => run_tv(&args, dir).await,
        Commands::People(args) => run_people(&args, dir).await,
        Commands::Search(args) => run_search(&args, dir).await,
        Commands::Details(cmd) => run_details(&cmd.command, dir).await,
        Commands::Language(cmd) => match cmd.command {
            LanguageSubcommands::Get => run_language_get(dir),
            LanguageSubcommands::Set { tag } => run_language_set(Some(&tag), dir).await,
            LanguageSubcommands::Unset => run_language_set(None, dir).await,
        },
        Commands::Theme(cmd) => run_theme(&cmd.command, dir),
        Commands::Cache(cmd) => match cmd.command {
            CacheSubcommands::Clear => run_cache_clear(dir).await,
        },
    }
}
