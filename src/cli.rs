use std::{future::Future, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::TokenMinter,
    client::Client,
    config::{ClientConfig, Credentials},
    debug::{self, DebugSettings},
    envelope::ListResponse,
    query::{LinkagesQuery, ListQuery, split_csv, split_csv_upper},
    render::{DeleteResult, OutputFormat, TableRows, TokenResult, render},
    resources::{
        WebhookCreateAttributes, WebhookUpdateAttributes,
        reports::{FinanceReportParams, SalesReportParams},
    },
};

#[derive(Parser, Debug)]
#[command(name = "asc", version, about = "App Store Connect CLI in Rust", long_about = None)]
pub struct Cli {
    /// Enable debug logging (overrides ASC_DEBUG)
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub debug: Option<bool>,

    /// Dump HTTP requests and responses with secrets redacted
    #[arg(
        long = "debug-http",
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub debug_http: Option<bool>,

    /// Output format: json, pretty, table or markdown (default: ASC_DEFAULT_OUTPUT or json)
    #[arg(short, long, global = true, value_name = "FORMAT")]
    pub output: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Installs the `--debug` / `--debug-http` overrides and returns the
    /// effective settings.
    pub fn debug_settings(&self) -> DebugSettings {
        debug::set_debug_override(self.debug);
        debug::set_debug_http_override(self.debug_http);
        debug::resolve()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a short-lived App Store Connect bearer token
    Token,
    /// Apps
    #[command(subcommand)]
    Apps(AppsCommand),
    /// Bundle IDs, their profiles and capabilities
    #[command(subcommand)]
    BundleIds(BundleIdsCommand),
    /// App webhooks and deliveries
    #[command(subcommand)]
    Webhooks(WebhooksCommand),
    /// Screenshots, previews and other uploaded assets
    #[command(subcommand)]
    Assets(AssetsCommand),
    /// Sales, finance and analytics report downloads
    #[command(subcommand)]
    Reports(ReportsCommand),
    /// Xcode Cloud products, workflows and build runs
    #[command(subcommand)]
    XcodeCloud(XcodeCloudCommand),
}

/// Paging flags shared by list commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Page size (1-200)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=200))]
    pub limit: Option<u32>,
    /// Continue from a `links.next` URL
    #[arg(long, value_name = "URL")]
    pub next: Option<String>,
    /// Follow `links.next` until the last page
    #[arg(long)]
    pub paginate: bool,
    /// Stop after this many pages (implies --paginate)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_pages: Option<u64>,
}

impl ListArgs {
    pub fn query(&self) -> ListQuery {
        let mut query = ListQuery::new();
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(next) = &self.next {
            query = query.next(next.clone());
        }
        query
    }

    fn follows_pages(&self) -> bool {
        self.paginate || self.max_pages.is_some()
    }

    fn page_cap(&self) -> Option<usize> {
        self.max_pages.and_then(|n| usize::try_from(n).ok())
    }
}

#[derive(Subcommand, Debug)]
pub enum AppsCommand {
    /// List apps
    List(ListArgs),
    /// Show one app
    Get {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BundleIdsCommand {
    /// List bundle IDs
    List(ListArgs),
    /// Show one bundle ID
    Get {
        #[arg(long)]
        id: String,
    },
    /// Show the app a bundle ID belongs to
    App {
        #[arg(long)]
        id: String,
    },
    /// Show the app linkage of a bundle ID
    AppLink {
        #[arg(long)]
        id: String,
    },
    /// List provisioning profiles of a bundle ID
    Profiles {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List capability linkages of a bundle ID
    Capabilities {
        #[arg(long)]
        id: String,
        /// Rejected by the server for this endpoint
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, value_name = "URL")]
        next: Option<String>,
    },
    /// List profile linkages of a bundle ID
    ProfileLinks {
        #[arg(long)]
        id: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=200))]
        limit: Option<u32>,
        #[arg(long, value_name = "URL")]
        next: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum WebhooksCommand {
    /// List webhooks for an app
    List {
        #[arg(long)]
        app: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show one webhook
    Get {
        #[arg(long)]
        id: String,
    },
    /// Create a webhook
    Create {
        #[arg(long)]
        app: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long, env = "ASC_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
        /// Comma-separated event types
        #[arg(long)]
        events: String,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Update a webhook
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        events: Option<String>,
        #[arg(long)]
        enabled: Option<bool>,
    },
    /// Delete a webhook
    Delete {
        #[arg(long)]
        id: String,
        /// Required to actually delete
        #[arg(long)]
        confirm: bool,
    },
    /// List deliveries of a webhook
    Deliveries {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Re-send a past delivery
    Redeliver {
        #[arg(long)]
        delivery: String,
    },
    /// Send a test ping
    Ping {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AssetsCommand {
    /// List screenshot sets of a version localization
    ScreenshotSets {
        #[arg(long)]
        localization: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Create a screenshot set for a display type
    CreateScreenshotSet {
        #[arg(long)]
        localization: String,
        #[arg(long)]
        display_type: String,
    },
    /// List screenshots in a set
    Screenshots {
        #[arg(long)]
        set: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Set the display order of screenshots in a set
    ReorderScreenshots {
        #[arg(long)]
        set: String,
        /// Screenshot IDs in display order, comma separated
        #[arg(long)]
        ids: String,
    },
    /// Delete a screenshot
    DeleteScreenshot {
        #[arg(long)]
        id: String,
        #[arg(long)]
        confirm: bool,
    },
    /// Upload a screenshot into a set
    UploadScreenshot {
        #[arg(long)]
        set: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Upload an app preview into a set
    UploadPreview {
        #[arg(long)]
        set: String,
        #[arg(long)]
        file: PathBuf,
        /// Defaults from the file extension
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Upload an App Clip default experience header image
    UploadAppClipHeader {
        #[arg(long)]
        localization: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Upload an App Clip advanced experience image
    UploadAppClipAdvancedImage {
        #[arg(long)]
        file: PathBuf,
    },
    /// Upload an App Store review attachment
    UploadReviewAttachment {
        #[arg(long)]
        review_detail: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Upload a background asset file
    UploadBackgroundAsset {
        #[arg(long)]
        version: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "ASSET")]
        asset_type: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ReportFileArgs {
    /// Destination file
    #[arg(long = "file", value_name = "PATH")]
    pub destination: PathBuf,
    /// Also write the decompressed report beside the download
    #[arg(long)]
    pub decompress: bool,
}

#[derive(Subcommand, Debug)]
pub enum ReportsCommand {
    /// Download a sales report
    Sales {
        #[arg(long, env = "ASC_VENDOR_NUMBER")]
        vendor: String,
        #[arg(long = "type")]
        report_type: String,
        #[arg(long = "subtype")]
        report_sub_type: String,
        #[arg(long)]
        frequency: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        version: Option<String>,
        #[command(flatten)]
        file: ReportFileArgs,
    },
    /// Download a finance report
    Finance {
        #[arg(long, env = "ASC_VENDOR_NUMBER")]
        vendor: String,
        #[arg(long = "type")]
        report_type: String,
        #[arg(long)]
        region: String,
        #[arg(long)]
        date: String,
        #[command(flatten)]
        file: ReportFileArgs,
    },
    /// Download an analytics report segment from its pre-signed URL
    AnalyticsSegment {
        #[arg(long)]
        url: String,
        #[command(flatten)]
        file: ReportFileArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum XcodeCloudCommand {
    /// List Xcode Cloud products
    Products(ListArgs),
    /// List workflows for a product
    Workflows {
        #[arg(short, long)]
        product: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List branches of a workflow's repository
    Branches {
        #[arg(short, long)]
        workflow: String,
    },
    /// List recent build runs for a workflow
    Runs {
        #[arg(short, long)]
        workflow: String,
        /// Server-side sort keys, comma separated (e.g. `-number`). Without it
        /// runs are shown newest first.
        #[arg(long, value_name = "KEYS", allow_hyphen_values = true)]
        sort: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show details for a build run
    Run {
        #[arg(short = 'r', long = "run")]
        run_id: String,
    },
    /// Start a build run for a workflow on a branch
    Start {
        #[arg(short, long)]
        workflow: String,
        /// Branch name, resolved in the workflow's repository
        #[arg(short, long, conflicts_with = "git_reference", required_unless_present = "git_reference")]
        branch: Option<String>,
        /// Git reference ID
        #[arg(long)]
        git_reference: Option<String>,
    },
    /// List actions of a build run
    Actions {
        #[arg(short = 'r', long = "run")]
        run_id: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List artifacts of a build action
    Artifacts {
        #[arg(short, long)]
        action: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Download an artifact
    DownloadArtifact {
        #[arg(long)]
        id: String,
        #[arg(long = "file", value_name = "PATH")]
        destination: PathBuf,
    },
}

pub async fn run_cli(cli: Cli, settings: DebugSettings, cancel: CancellationToken) -> Result<()> {
    let format = OutputFormat::resolve(cli.output.as_deref()).map_err(anyhow::Error::msg)?;

    if let Commands::Token = cli.command {
        let credentials = Credentials::from_env().context("token")?;
        let token = TokenMinter::new(&credentials)
            .context("token")?
            .token()
            .await
            .context("token")?;
        return print_output(&TokenResult { token }, format);
    }

    let config = ClientConfig::from_env()?.with_debug(settings);
    let client = Client::new(Credentials::from_env()?, config)?.with_cancellation(cancel);

    match cli.command {
        Commands::Token => Ok(()),
        Commands::Apps(cmd) => apps_cmd(&client, cmd, format).await,
        Commands::BundleIds(cmd) => bundle_ids_cmd(&client, cmd, format).await,
        Commands::Webhooks(cmd) => webhooks_cmd(&client, cmd, format).await,
        Commands::Assets(cmd) => assets_cmd(&client, cmd, format).await,
        Commands::Reports(cmd) => reports_cmd(&client, cmd, format).await,
        Commands::XcodeCloud(cmd) => xcode_cloud_cmd(&client, cmd, format).await,
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(msg.to_string());
    pb
}

fn print_output<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + TableRows + ?Sized,
{
    let text = render(value, format)?;
    if text.ends_with('\n') {
        print!("{text}");
    } else {
        println!("{text}");
    }
    Ok(())
}

/// Fetches the first page and, when asked, follows `links.next`.
async fn list_pages<A, F, Fut>(client: &Client, list: &ListArgs, fetch: F) -> crate::Result<ListResponse<A>>
where
    A: DeserializeOwned,
    F: FnOnce(ListQuery) -> Fut,
    Fut: Future<Output = crate::Result<ListResponse<A>>>,
{
    let first = fetch(list.query()).await?;
    if !list.follows_pages() {
        return Ok(first);
    }
    let pb = spinner("Loading pages...");
    let all = client.paginate_from(first, list.page_cap()).await;
    pb.finish_and_clear();
    all
}

fn require_confirm(confirm: bool, what: &str) -> Result<()> {
    if !confirm {
        bail!("--confirm is required to delete {what}");
    }
    Ok(())
}

async fn apps_cmd(client: &Client, cmd: AppsCommand, format: OutputFormat) -> Result<()> {
    match cmd {
        AppsCommand::List(list) => {
            let apps = list_pages(client, &list, |q| async move { client.list_apps(&q).await })
                .await
                .context("apps list")?;
            print_output(&apps, format)
        }
        AppsCommand::Get { id } => {
            let app = client.get_app(&id).await.context("apps get")?;
            print_output(&app, format)
        }
    }
}

async fn bundle_ids_cmd(client: &Client, cmd: BundleIdsCommand, format: OutputFormat) -> Result<()> {
    match cmd {
        BundleIdsCommand::List(list) => {
            let bundles = list_pages(client, &list, |q| async move {
                client.list_bundle_ids(&q).await
            })
            .await
            .context("bundle-ids list")?;
            print_output(&bundles, format)
        }
        BundleIdsCommand::Get { id } => {
            let bundle = client.get_bundle_id(&id).await.context("bundle-ids get")?;
            print_output(&bundle, format)
        }
        BundleIdsCommand::App { id } => {
            let app = client.get_bundle_id_app(&id).await.context("bundle-ids app")?;
            print_output(&app, format)
        }
        BundleIdsCommand::AppLink { id } => {
            let link = client
                .get_bundle_id_app_relationship(&id)
                .await
                .context("bundle-ids app-link")?;
            print_output(&link, format)
        }
        BundleIdsCommand::Profiles { id, list } => {
            let profiles = list_pages(client, &list, |q| {
                let id = id.clone();
                async move { client.get_bundle_id_profiles(&id, &q).await }
            })
            .await
            .context("bundle-ids profiles")?;
            print_output(&profiles, format)
        }
        BundleIdsCommand::Capabilities { id, limit, next } => {
            let query = linkages_query(limit, next);
            let links = client
                .get_bundle_id_capabilities_relationships(&id, &query)
                .await
                .context("bundle-ids capabilities")?;
            print_output(&links, format)
        }
        BundleIdsCommand::ProfileLinks { id, limit, next } => {
            let query = linkages_query(limit, next);
            let links = client
                .get_bundle_id_profiles_relationships(&id, &query)
                .await
                .context("bundle-ids profile-links")?;
            print_output(&links, format)
        }
    }
}

fn linkages_query(limit: Option<u32>, next: Option<String>) -> LinkagesQuery {
    let mut query = LinkagesQuery::new();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if let Some(next) = next {
        query = query.next(next);
    }
    query
}

async fn webhooks_cmd(client: &Client, cmd: WebhooksCommand, format: OutputFormat) -> Result<()> {
    match cmd {
        WebhooksCommand::List { app, list } => {
            let hooks = list_pages(client, &list, |q| {
                let app = app.clone();
                async move { client.list_app_webhooks(&app, &q).await }
            })
            .await
            .context("webhooks list")?;
            print_output(&hooks, format)
        }
        WebhooksCommand::Get { id } => {
            let hook = client.get_webhook(&id).await.context("webhooks get")?;
            print_output(&hook, format)
        }
        WebhooksCommand::Create { app, name, url, secret, events, enabled } => {
            let attributes = WebhookCreateAttributes {
                enabled,
                event_types: split_csv_upper(&events),
                name: name.trim().to_string(),
                secret,
                url: url.trim().to_string(),
            };
            let hook = client
                .create_webhook(&app, attributes)
                .await
                .context("webhooks create")?;
            print_output(&hook, format)
        }
        WebhooksCommand::Update { id, name, url, secret, events, enabled } => {
            let attributes = WebhookUpdateAttributes {
                enabled,
                event_types: events.as_deref().map(split_csv_upper),
                name,
                secret,
                url,
            };
            let hook = client
                .update_webhook(&id, attributes)
                .await
                .context("webhooks update")?;
            print_output(&hook, format)
        }
        WebhooksCommand::Delete { id, confirm } => {
            require_confirm(confirm, "a webhook")?;
            client.delete_webhook(&id).await.context("webhooks delete")?;
            print_output(&DeleteResult { id: id.trim().to_string(), deleted: true }, format)
        }
        WebhooksCommand::Deliveries { id, list } => {
            let deliveries = list_pages(client, &list, |q| {
                let id = id.clone();
                async move { client.list_webhook_deliveries(&id, &q).await }
            })
            .await
            .context("webhooks deliveries")?;
            print_output(&deliveries, format)
        }
        WebhooksCommand::Redeliver { delivery } => {
            let redelivered = client
                .redeliver_webhook_delivery(&delivery)
                .await
                .context("webhooks redeliver")?;
            print_output(&redelivered, format)
        }
        WebhooksCommand::Ping { id } => {
            let ping = client.ping_webhook(&id).await.context("webhooks ping")?;
            print_output(&ping, format)
        }
    }
}

async fn assets_cmd(client: &Client, cmd: AssetsCommand, format: OutputFormat) -> Result<()> {
    match cmd {
        AssetsCommand::ScreenshotSets { localization, list } => {
            let sets = list_pages(client, &list, |q| {
                let localization = localization.clone();
                async move { client.list_screenshot_sets(&localization, &q).await }
            })
            .await
            .context("assets screenshot-sets")?;
            print_output(&sets, format)
        }
        AssetsCommand::CreateScreenshotSet { localization, display_type } => {
            let set = client
                .create_screenshot_set(&localization, &display_type)
                .await
                .context("assets create-screenshot-set")?;
            print_output(&set, format)
        }
        AssetsCommand::Screenshots { set, list } => {
            let shots = list_pages(client, &list, |q| {
                let set = set.clone();
                async move { client.list_screenshots(&set, &q).await }
            })
            .await
            .context("assets screenshots")?;
            print_output(&shots, format)
        }
        AssetsCommand::ReorderScreenshots { set, ids } => {
            client
                .reorder_screenshots(&set, split_csv(&ids))
                .await
                .context("assets reorder-screenshots")?;
            let order = client
                .get_screenshot_set_screenshot_ids(&set, &LinkagesQuery::new())
                .await
                .context("assets reorder-screenshots")?;
            print_output(&order, format)
        }
        AssetsCommand::DeleteScreenshot { id, confirm } => {
            require_confirm(confirm, "a screenshot")?;
            client
                .delete_screenshot(&id)
                .await
                .context("assets delete-screenshot")?;
            print_output(&DeleteResult { id: id.trim().to_string(), deleted: true }, format)
        }
        AssetsCommand::UploadScreenshot { set, file } => {
            let pb = spinner("Uploading screenshot...");
            let result = client.upload_screenshot(&set, &file).await;
            pb.finish_and_clear();
            print_output(&result.context("assets upload-screenshot")?, format)
        }
        AssetsCommand::UploadPreview { set, file, mime_type } => {
            let pb = spinner("Uploading preview...");
            let result = client.upload_preview(&set, &file, mime_type.as_deref()).await;
            pb.finish_and_clear();
            print_output(&result.context("assets upload-preview")?, format)
        }
        AssetsCommand::UploadAppClipHeader { localization, file } => {
            let pb = spinner("Uploading header image...");
            let result = client.upload_app_clip_header_image(&localization, &file).await;
            pb.finish_and_clear();
            print_output(&result.context("assets upload-app-clip-header")?, format)
        }
        AssetsCommand::UploadAppClipAdvancedImage { file } => {
            let pb = spinner("Uploading image...");
            let result = client.upload_app_clip_advanced_experience_image(&file).await;
            pb.finish_and_clear();
            print_output(&result.context("assets upload-app-clip-advanced-image")?, format)
        }
        AssetsCommand::UploadReviewAttachment { review_detail, file } => {
            let pb = spinner("Uploading attachment...");
            let result = client.upload_review_attachment(&review_detail, &file).await;
            pb.finish_and_clear();
            print_output(&result.context("assets upload-review-attachment")?, format)
        }
        AssetsCommand::UploadBackgroundAsset { version, file, asset_type } => {
            let pb = spinner("Uploading background asset...");
            let result = client
                .upload_background_asset_file(&version, &file, &asset_type)
                .await;
            pb.finish_and_clear();
            print_output(&result.context("assets upload-background-asset")?, format)
        }
    }
}

async fn reports_cmd(client: &Client, cmd: ReportsCommand, format: OutputFormat) -> Result<()> {
    let pb = spinner("Downloading report...");
    let result = match cmd {
        ReportsCommand::Sales {
            vendor,
            report_type,
            report_sub_type,
            frequency,
            date,
            version,
            file,
        } => {
            let params = SalesReportParams {
                vendor_number: vendor,
                report_type,
                report_sub_type,
                frequency,
                report_date: date,
                version,
            };
            client
                .download_sales_report(&params, file.destination, file.decompress)
                .await
                .context("reports sales")
        }
        ReportsCommand::Finance { vendor, report_type, region, date, file } => {
            let params = FinanceReportParams {
                vendor_number: vendor,
                report_type,
                region_code: region,
                report_date: date,
            };
            client
                .download_finance_report(&params, file.destination, file.decompress)
                .await
                .context("reports finance")
        }
        ReportsCommand::AnalyticsSegment { url, file } => client
            .download_analytics_segment(&url, file.destination, file.decompress)
            .await
            .context("reports analytics-segment"),
    };
    pb.finish_and_clear();
    print_output(&result?, format)
}

async fn xcode_cloud_cmd(client: &Client, cmd: XcodeCloudCommand, format: OutputFormat) -> Result<()> {
    match cmd {
        XcodeCloudCommand::Products(list) => {
            let products = list_pages(client, &list, |q| async move {
                client.list_ci_products(&q).await
            })
            .await
            .context("xcode-cloud products")?;
            print_output(&products, format)
        }
        XcodeCloudCommand::Workflows { product, list } => {
            let workflows = list_pages(client, &list, |q| {
                let product = product.clone();
                async move { client.list_workflows(&product, &q).await }
            })
            .await
            .context("xcode-cloud workflows")?;
            print_output(&workflows, format)
        }
        XcodeCloudCommand::Branches { workflow } => {
            let pb = spinner("Loading branches...");
            let branches = match client.workflow_repository_id(&workflow).await {
                Ok(Some(id)) => client.list_branches(&id).await,
                Ok(None) => Ok(Vec::new()),
                Err(err) => Err(err),
            };
            pb.finish_and_clear();
            print_output(&branches.context("xcode-cloud branches")?, format)
        }
        XcodeCloudCommand::Runs { workflow, sort, list } => {
            let sort_keys = sort.as_deref().map(split_csv).unwrap_or_default();
            let newest_first = sort_keys.is_empty();
            let mut runs = list_pages(client, &list, |q| {
                let workflow = workflow.clone();
                let q = if newest_first { q } else { q.sort(sort_keys) };
                async move { client.list_build_runs(&workflow, &q).await }
            })
            .await
            .context("xcode-cloud runs")?;
            if newest_first {
                runs.data.sort_by(crate::resources::xcode_cloud::compare_runs_desc);
            }
            print_output(&runs, format)
        }
        XcodeCloudCommand::Run { run_id } => {
            let run = client.get_build_run(&run_id).await.context("xcode-cloud run")?;
            print_output(&run, format)
        }
        XcodeCloudCommand::Start { workflow, branch, git_reference } => {
            let reference_id = match (git_reference, branch) {
                (Some(id), _) => id,
                (None, Some(branch)) => client
                    .find_workflow_branch(&workflow, &branch)
                    .await
                    .context("xcode-cloud start")?
                    .id,
                (None, None) => bail!("either --branch or --git-reference is required"),
            };
            let run = client
                .start_build_run(&workflow, &reference_id)
                .await
                .context("xcode-cloud start")?;
            print_output(&run, format)
        }
        XcodeCloudCommand::Actions { run_id, list } => {
            let actions = list_pages(client, &list, |q| {
                let run_id = run_id.clone();
                async move { client.list_build_actions(&run_id, &q).await }
            })
            .await
            .context("xcode-cloud actions")?;
            print_output(&actions, format)
        }
        XcodeCloudCommand::Artifacts { action, list } => {
            let artifacts = list_pages(client, &list, |q| {
                let action = action.clone();
                async move { client.list_artifacts(&action, &q).await }
            })
            .await
            .context("xcode-cloud artifacts")?;
            print_output(&artifacts, format)
        }
        XcodeCloudCommand::DownloadArtifact { id, destination } => {
            let pb = spinner("Downloading artifact...");
            let result = client.download_artifact(&id, destination).await;
            pb.finish_and_clear();
            print_output(&result.context("xcode-cloud download-artifact")?, format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn debug_flag_forms() {
        let cli = Cli::try_parse_from(["asc", "--debug", "token"]).unwrap();
        assert_eq!(cli.debug, Some(true));
        let cli = Cli::try_parse_from(["asc", "--debug=false", "--debug-http", "token"]).unwrap();
        assert_eq!(cli.debug, Some(false));
        assert_eq!(cli.debug_http, Some(true));
        let cli = Cli::try_parse_from(["asc", "token"]).unwrap();
        assert_eq!(cli.debug, None);
    }

    #[test]
    fn limit_is_range_checked() {
        assert!(Cli::try_parse_from(["asc", "apps", "list", "--limit", "201"]).is_err());
        assert!(Cli::try_parse_from(["asc", "apps", "list", "--limit", "0"]).is_err());
        let cli = Cli::try_parse_from(["asc", "apps", "list", "--limit", "200", "--max-pages", "3"])
            .unwrap();
        let Commands::Apps(AppsCommand::List(list)) = cli.command else {
            panic!("expected apps list");
        };
        assert!(list.follows_pages());
        assert_eq!(list.page_cap(), Some(3));
        assert_eq!(list.query().limit, 200);
    }

    #[test]
    fn runs_sort_is_optional() {
        let cli = Cli::try_parse_from(["asc", "xcode-cloud", "runs", "-w", "wf-1", "--sort", "-number"])
            .unwrap();
        let Commands::XcodeCloud(XcodeCloudCommand::Runs { sort, .. }) = cli.command else {
            panic!("expected xcode-cloud runs");
        };
        assert_eq!(sort.as_deref(), Some("-number"));

        let cli = Cli::try_parse_from(["asc", "xcode-cloud", "runs", "-w", "wf-1"]).unwrap();
        let Commands::XcodeCloud(XcodeCloudCommand::Runs { sort, .. }) = cli.command else {
            panic!("expected xcode-cloud runs");
        };
        assert_eq!(sort, None);
    }
}
