//! CLI command definitions and argument parsing.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Parser, Subcommand};
use koe_domain::{
    AccelerationCaseId, ActorRole, ClaimCategory, EventType, OwnerDecision, ResponseResult, TrackKind,
};
use std::path::PathBuf;

/// KOE - Adjudicate change-order claims under NS 8407.
#[derive(Debug, Parser)]
#[command(name = "koe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KOE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Case database path
    #[arg(long, global = true, env = "KOE_DB")]
    pub db: Option<PathBuf>,

    /// Verbose logging (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (bare values)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Append an event to a case log
    Append(AppendArgs),

    /// Show the folded state of a case
    Status(CaseArgs),

    /// Show the event history of a case
    Log(CaseArgs),

    /// List stored cases
    Cases,

    /// Evaluate whether a notice is precluded as late
    Preclusion(PreclusionArgs),

    /// Compute the approval grade
    Grade(GradeArgs),

    /// Resolve the consequence of a basis decision
    Consequence(ConsequenceArgs),

    /// Aggregate rejected schedule tracks into an acceleration claim and track it
    Forsering(ForseringArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for commands addressing one case.
#[derive(Debug, Parser)]
pub struct CaseArgs {
    /// Case identifier
    pub case: String,
}

/// Arguments for the append command.
#[derive(Debug, Parser)]
pub struct AppendArgs {
    /// Case identifier
    pub case: String,

    /// Case version the event was prepared against
    #[arg(short = 'e', long)]
    pub expected_version: u64,

    /// Track the event targets
    #[arg(short, long, value_enum)]
    pub track: TrackArg,

    /// Event type
    #[arg(long = "event", value_enum)]
    pub event_type: EventArg,

    /// Submitting party
    #[arg(short, long, value_enum)]
    pub actor: ActorArg,

    /// When the action happened (RFC 3339); defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,

    /// Claimed value (NOK or days)
    #[arg(long)]
    pub claimed: Option<f64>,

    /// Approved value (NOK or days)
    #[arg(long)]
    pub approved: Option<f64>,

    /// Response result
    #[arg(short, long, value_enum)]
    pub result: Option<ResultArg>,

    /// When the circumstance was discovered (YYYY-MM-DD)
    #[arg(long)]
    pub discovery: Option<NaiveDate>,

    /// When notice was given (YYYY-MM-DD)
    #[arg(long)]
    pub notice: Option<NaiveDate>,

    /// Owner's timeliness assessment
    #[arg(long)]
    pub was_timely: Option<bool>,

    /// Case title (opening event)
    #[arg(long, requires_all = ["owner", "contractor"])]
    pub title: Option<String>,

    /// Owner name (opening event)
    #[arg(long, requires = "title")]
    pub owner: Option<String>,

    /// Contractor name (opening event)
    #[arg(long, requires = "title")]
    pub contractor: Option<String>,

    /// Claim category (opening event)
    #[arg(long, value_enum, requires = "title")]
    pub category: Option<CategoryArg>,

    /// Free-text remark
    #[arg(long)]
    pub comment: Option<String>,
}

/// Arguments for the preclusion command.
#[derive(Debug, Parser)]
pub struct PreclusionArgs {
    /// When the circumstance was discovered (YYYY-MM-DD)
    #[arg(short, long)]
    pub discovery: Option<NaiveDate>,

    /// When notice was sent (YYYY-MM-DD)
    #[arg(short, long)]
    pub notice: Option<NaiveDate>,

    /// End of the observation window if no notice was sent (YYYY-MM-DD)
    #[arg(short, long)]
    pub window_end: Option<NaiveDate>,

    /// Claim category
    #[arg(long, value_enum, default_value = "other")]
    pub category: CategoryArg,

    /// Lateness has been invoked by the objecting party
    #[arg(short, long)]
    pub invoked_late: bool,
}

/// Arguments for the grade command.
#[derive(Debug, Parser)]
pub struct GradeArgs {
    /// Claimed value
    #[arg(long)]
    pub claimed: f64,

    /// Approved value
    #[arg(long)]
    pub approved: f64,
}

/// Arguments for the consequence command.
#[derive(Debug, Parser)]
pub struct ConsequenceArgs {
    /// Basis decision
    #[arg(short, long, value_enum)]
    pub result: BasisArg,

    /// Category carries a hard notice deadline
    #[arg(long)]
    pub special: bool,

    /// Owner's timeliness assessment
    #[arg(long)]
    pub timely: Option<bool>,

    /// Category is force majeure
    #[arg(long)]
    pub force_majeure: bool,

    /// The decision reverses an earlier rejection
    #[arg(long)]
    pub reversal: bool,

    /// Dependent tracks hold subsidiary responses
    #[arg(long)]
    pub has_subsidiary: bool,
}

/// Arguments for the forsering command.
#[derive(Debug, Parser)]
pub struct ForseringArgs {
    #[command(subcommand)]
    pub action: ForseringAction,
}

/// Acceleration actions.
#[derive(Debug, Subcommand)]
pub enum ForseringAction {
    /// Compute the ceiling for a set of cases without saving anything
    Preview(EstimateArgs),

    /// Open an acceleration case over rejected schedule tracks
    Open(OpenArgs),

    /// Show the folded state of an acceleration case
    Show(AccelerationArgs),

    /// List stored acceleration cases
    List,

    /// Reference one more rejected schedule track
    AddTrack(TrackRefArgs),

    /// Drop a referenced schedule track
    RemoveTrack(TrackRefArgs),

    /// Revise the cost estimate
    Revise(ReviseArgs),

    /// Record the notice of intent to accelerate
    Notify(NotifyArgs),

    /// Start accelerating
    Activate(StepArgs),

    /// Record the cost incurred so far
    Cost(CostArgs),

    /// Record the owner's answer
    Respond(RespondArgs),

    /// Stop accelerating
    Stop(StepArgs),
}

/// Cases and figures an acceleration is computed from.
#[derive(Debug, Parser)]
pub struct EstimateArgs {
    /// Cases whose rejected schedule tracks are aggregated
    #[arg(long = "case", required = true)]
    pub cases: Vec<String>,

    /// Daily penalty rate (NOK per day)
    #[arg(long)]
    pub rate: f64,

    /// Estimated acceleration cost (NOK)
    #[arg(long)]
    pub estimated: f64,

    /// Percentage-of-contract ceiling confirmed
    #[arg(long)]
    pub confirmed: bool,

    /// Contract value, for the percentage cap (NOK)
    #[arg(long)]
    pub contract_value: Option<f64>,
}

/// Arguments for opening an acceleration case.
#[derive(Debug, Parser)]
pub struct OpenArgs {
    #[command(flatten)]
    pub estimate: EstimateArgs,

    /// When the case was opened (RFC 3339); defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

/// Arguments addressing one acceleration case.
#[derive(Debug, Parser)]
pub struct AccelerationArgs {
    /// Acceleration case identifier
    pub id: AccelerationCaseId,
}

/// Arguments shared by every recorded acceleration action.
#[derive(Debug, Parser)]
pub struct StepArgs {
    /// Acceleration case identifier
    pub id: AccelerationCaseId,

    /// Acceleration version the action was prepared against
    #[arg(short = 'e', long)]
    pub expected_version: u64,

    /// When the action happened (RFC 3339); defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

/// Arguments for adding or removing a track reference.
#[derive(Debug, Parser)]
pub struct TrackRefArgs {
    #[command(flatten)]
    pub step: StepArgs,

    /// Case whose schedule track is referenced
    #[arg(long)]
    pub case: String,
}

/// Arguments for revising the estimate.
#[derive(Debug, Parser)]
pub struct ReviseArgs {
    #[command(flatten)]
    pub step: StepArgs,

    /// New estimated cost (NOK)
    #[arg(long)]
    pub estimated: f64,

    /// Percentage-of-contract ceiling confirmed
    #[arg(long)]
    pub confirmed: bool,
}

/// Arguments for the notice of intent.
#[derive(Debug, Parser)]
pub struct NotifyArgs {
    #[command(flatten)]
    pub step: StepArgs,

    /// Date the owner was notified (YYYY-MM-DD)
    #[arg(long)]
    pub notice_date: NaiveDate,
}

/// Arguments for recording incurred cost.
#[derive(Debug, Parser)]
pub struct CostArgs {
    #[command(flatten)]
    pub step: StepArgs,

    /// Total cost incurred so far (NOK)
    #[arg(long)]
    pub amount: f64,
}

/// Arguments for the owner's answer.
#[derive(Debug, Parser)]
pub struct RespondArgs {
    #[command(flatten)]
    pub step: StepArgs,

    /// Owner's decision
    #[arg(short, long, value_enum)]
    pub decision: DecisionArg,
}

/// Arguments for configuration management.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Track argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum TrackArg {
    /// Basis (grunnlag)
    Basis,
    /// Compensation (vederlag)
    Compensation,
    /// Schedule (frist)
    Schedule,
}

/// Event type argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum EventArg {
    /// Claim sent
    ClaimSent,
    /// Claim updated
    ClaimUpdated,
    /// Claim withdrawn
    ClaimWithdrawn,
    /// Response given
    ResponseGiven,
    /// Response updated
    ResponseUpdated,
    /// Negotiation opened
    NegotiationOpened,
    /// Claim locked
    Locked,
}

/// Actor argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ActorArg {
    /// Contractor (entreprenør)
    Contractor,
    /// Owner (byggherre)
    Owner,
}

/// Response result argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ResultArg {
    /// Approved in full
    Approved,
    /// Rejected
    Rejected,
    /// Approved in part
    PartiallyApproved,
    /// Requirement waived
    Waived,
}

/// Basis decision argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum BasisArg {
    /// Basis recognised
    Approved,
    /// Basis rejected
    Rejected,
    /// Requirement waived
    Waived,
}

/// Owner decision argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum DecisionArg {
    /// Acceleration cost accepted
    Accepted,
    /// Acceleration cost rejected
    Rejected,
}

/// Claim category argument.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CategoryArg {
    /// Instruction without a formal change order
    IrregularChange,
    /// Defect in the owner's deliveries
    OwnerDefect,
    /// Force majeure
    ForceMajeure,
    /// Delay caused by the owner
    ScheduleDelay,
    /// Formal change order
    OrderedChange,
    /// Anything else
    Other,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}

impl From<TrackArg> for TrackKind {
    fn from(track: TrackArg) -> Self {
        match track {
            TrackArg::Basis => TrackKind::Basis,
            TrackArg::Compensation => TrackKind::Compensation,
            TrackArg::Schedule => TrackKind::Schedule,
        }
    }
}

impl From<EventArg> for EventType {
    fn from(event: EventArg) -> Self {
        match event {
            EventArg::ClaimSent => EventType::ClaimSent,
            EventArg::ClaimUpdated => EventType::ClaimUpdated,
            EventArg::ClaimWithdrawn => EventType::ClaimWithdrawn,
            EventArg::ResponseGiven => EventType::ResponseGiven,
            EventArg::ResponseUpdated => EventType::ResponseUpdated,
            EventArg::NegotiationOpened => EventType::NegotiationOpened,
            EventArg::Locked => EventType::Locked,
        }
    }
}

impl From<ActorArg> for ActorRole {
    fn from(actor: ActorArg) -> Self {
        match actor {
            ActorArg::Contractor => ActorRole::Contractor,
            ActorArg::Owner => ActorRole::Owner,
        }
    }
}

impl From<ResultArg> for ResponseResult {
    fn from(result: ResultArg) -> Self {
        match result {
            ResultArg::Approved => ResponseResult::Approved,
            ResultArg::Rejected => ResponseResult::Rejected,
            ResultArg::PartiallyApproved => ResponseResult::PartiallyApproved,
            ResultArg::Waived => ResponseResult::Waived,
        }
    }
}

impl From<BasisArg> for koe_domain::BasisDecision {
    fn from(result: BasisArg) -> Self {
        match result {
            BasisArg::Approved => koe_domain::BasisDecision::Approved,
            BasisArg::Rejected => koe_domain::BasisDecision::Rejected,
            BasisArg::Waived => koe_domain::BasisDecision::Waived,
        }
    }
}

impl From<DecisionArg> for OwnerDecision {
    fn from(decision: DecisionArg) -> Self {
        match decision {
            DecisionArg::Accepted => OwnerDecision::Accepted,
            DecisionArg::Rejected => OwnerDecision::Rejected,
        }
    }
}

impl From<CategoryArg> for ClaimCategory {
    fn from(category: CategoryArg) -> Self {
        match category {
            CategoryArg::IrregularChange => ClaimCategory::IrregularChange,
            CategoryArg::OwnerDefect => ClaimCategory::OwnerDefect,
            CategoryArg::ForceMajeure => ClaimCategory::ForceMajeure,
            CategoryArg::ScheduleDelay => ClaimCategory::ScheduleDelay,
            CategoryArg::OrderedChange => ClaimCategory::OrderedChange,
            CategoryArg::Other => ClaimCategory::Other,
        }
    }
}
