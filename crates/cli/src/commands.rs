//! Subcommands and their handlers.

use anyhow::{anyhow, Result};
use clap::{Subcommand, ValueEnum};
use roadmap_core::{
    AcceptanceCriterion, Adr, AdrStatus, CriterionStatus, Iteration, IterationStatus,
    MoveDirection, Roadmap, Task, TaskStatus, Track, TrackStatus, VerificationType,
};
use roadmap_storage::{
    move_iteration, move_task, move_track, CriterionFilter, Repository, TaskFilter, TrackFilter,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Create a roadmap, optionally setting the project code
    Init {
        /// Product vision
        vision: String,
        /// How success is measured
        #[arg(long, default_value = "")]
        success_criteria: String,
        /// Project code used in generated ids
        #[arg(long)]
        code: Option<String>,
    },
    /// Show the active roadmap and its tracks
    Status,
    /// Show or set the project code
    Code {
        /// New code
        code: Option<String>,
    },
    /// Check whether a task may be marked done
    CheckReady {
        /// Task ID
        task_id: String,
    },
    /// Track commands
    #[command(subcommand)]
    Track(TrackCommand),
    /// Task commands
    #[command(subcommand)]
    Task(TaskCommand),
    /// Iteration commands
    #[command(subcommand)]
    Iteration(IterationCommand),
    /// Acceptance criterion commands
    #[command(subcommand)]
    Ac(AcCommand),
    /// Architecture decision record commands
    #[command(subcommand)]
    Adr(AdrCommand),
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

impl From<Direction> for MoveDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => MoveDirection::Up,
            Direction::Down => MoveDirection::Down,
        }
    }
}

#[derive(Subcommand)]
pub enum TrackCommand {
    /// Create a track in the active roadmap
    Create {
        /// Track ID, e.g. track-core-api
        id: String,
        /// Title
        #[arg(long)]
        title: String,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
        /// Rank, lower first
        #[arg(long)]
        rank: Option<i64>,
        /// Track this one depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },
    /// List tracks of the active roadmap
    List {
        /// Only these statuses (repeatable)
        #[arg(long)]
        status: Vec<TrackStatus>,
    },
    /// Show a track with its tasks
    Show {
        /// Track ID
        id: String,
    },
    /// Change track fields
    Update {
        /// Track ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TrackStatus>,
        #[arg(long)]
        rank: Option<i64>,
    },
    /// Add a dependency
    Depend {
        /// Track ID
        id: String,
        /// Track it depends on
        on: String,
    },
    /// Remove a dependency
    Undepend {
        /// Track ID
        id: String,
        /// Track it no longer depends on
        on: String,
    },
    /// Move one position up or down
    Move {
        /// Track ID
        id: String,
        direction: Direction,
    },
    /// Delete a track
    Delete {
        /// Track ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task
    Create {
        /// Owning track
        track_id: String,
        /// Title
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Rank, 1-1000
        #[arg(long)]
        rank: Option<i64>,
        /// Git branch
        #[arg(long)]
        branch: Option<String>,
    },
    /// List tasks
    List {
        /// Only tasks of this track
        #[arg(long)]
        track: Option<String>,
        /// Only these statuses (repeatable)
        #[arg(long)]
        status: Vec<TaskStatus>,
    },
    /// Show a task with its acceptance criteria
    Show {
        /// Task ID
        id: String,
    },
    /// Change task fields; marking done runs the completion checks
    Update {
        /// Task ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        rank: Option<i64>,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Move a task to another track
    MoveTrack {
        /// Task ID
        id: String,
        /// Destination track
        track_id: String,
    },
    /// Move one position up or down within its track
    Move {
        /// Task ID
        id: String,
        direction: Direction,
    },
    /// Tasks in no iteration that are not done
    Backlog,
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum IterationCommand {
    /// Create an iteration
    Create {
        /// Name
        name: String,
        #[arg(long, default_value = "")]
        goal: String,
        #[arg(long, default_value = "")]
        deliverable: String,
        /// Explicit number; the next free one otherwise
        #[arg(long, default_value_t = 0)]
        number: i64,
    },
    /// List iterations
    List,
    /// Show an iteration with its tasks
    Show {
        /// Iteration number
        number: i64,
    },
    /// Show the current iteration
    Current,
    /// Add a task
    Add {
        /// Iteration number
        number: i64,
        /// Task ID
        task_id: String,
    },
    /// Remove a task
    Remove {
        /// Iteration number
        number: i64,
        /// Task ID
        task_id: String,
    },
    /// Make a planned iteration current
    Start {
        /// Iteration number
        number: i64,
    },
    /// Complete the current iteration
    Complete {
        /// Iteration number
        number: i64,
    },
    /// Move one position up or down
    Move {
        /// Iteration number
        number: i64,
        direction: Direction,
    },
    /// Delete an iteration
    Delete {
        /// Iteration number
        number: i64,
    },
}

#[derive(Subcommand)]
pub enum AcCommand {
    /// Add an acceptance criterion to a task
    Add {
        /// Task ID
        task_id: String,
        /// What must hold
        description: String,
        /// Checked by automation rather than a person
        #[arg(long)]
        automated: bool,
        /// How to test it
        #[arg(long)]
        instructions: Option<String>,
    },
    /// List criteria
    List {
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        track: Option<String>,
        #[arg(long)]
        iteration: Option<i64>,
        /// Only these statuses (repeatable)
        #[arg(long)]
        status: Vec<CriterionStatus>,
    },
    /// Mark verified by a person
    Verify {
        id: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Mark verified by automation
    AutoVerify {
        id: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Ask for human review
    Review { id: String },
    /// Mark failed with a reason
    Fail { id: String, reason: String },
    /// Delete a criterion
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum AdrCommand {
    /// Record a decision for a track
    Create {
        /// Track ID
        track_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        context: String,
        #[arg(long)]
        decision: String,
        #[arg(long)]
        consequences: String,
        #[arg(long, default_value = "")]
        alternatives: String,
    },
    /// List ADRs
    List {
        #[arg(long)]
        track: Option<String>,
    },
    /// Show an ADR
    Show { id: String },
    /// Mark accepted
    Accept { id: String },
    /// Mark superseded by another ADR
    Supersede { id: String, by: String },
    /// Mark deprecated
    Deprecate { id: String },
}

pub async fn run(repo: &dyn Repository, command: Commands) -> Result<()> {
    match command {
        Commands::Init { vision, success_criteria, code } => {
            if let Some(code) = code {
                repo.set_project_code(&code).await?;
            }
            let roadmap = repo.create_roadmap(Roadmap::new(vision, success_criteria)?).await?;
            println!("Created roadmap: {}", roadmap.id);
        }
        Commands::Status => {
            let roadmap = active_roadmap(repo).await?;
            let aggregate = repo.get_roadmap_with_tracks(&roadmap.id).await?;
            println!("Roadmap: {}", roadmap.id);
            println!("  Vision: {}", roadmap.vision);
            println!("  Success criteria: {}", roadmap.success_criteria);
            println!("Tracks ({})", aggregate.tracks.len());
            for track in &aggregate.tracks {
                print_track_line(track);
            }
            if let Some(current) = repo.get_current_iteration().await? {
                println!("Current iteration: {} - {}", current.number, current.name);
            }
        }
        Commands::Code { code: Some(code) } => {
            repo.set_project_code(&code).await?;
            println!("Project code: {code}");
        }
        Commands::Code { code: None } => {
            println!("Project code: {}", repo.project_code().await?);
        }
        Commands::CheckReady { task_id } => {
            repo.check_task_completion(&task_id).await?;
            println!("Task {task_id} is ready to be marked done");
        }
        Commands::Track(command) => run_track(repo, command).await?,
        Commands::Task(command) => run_task(repo, command).await?,
        Commands::Iteration(command) => run_iteration(repo, command).await?,
        Commands::Ac(command) => run_ac(repo, command).await?,
        Commands::Adr(command) => run_adr(repo, command).await?,
    }
    Ok(())
}

async fn active_roadmap(repo: &dyn Repository) -> Result<Roadmap> {
    repo.get_active_roadmap()
        .await?
        .ok_or_else(|| anyhow!("no roadmap yet; run `roadmap init` first"))
}

async fn run_track(repo: &dyn Repository, command: TrackCommand) -> Result<()> {
    match command {
        TrackCommand::Create { id, title, description, rank, depends_on } => {
            let roadmap = active_roadmap(repo).await?;
            let mut track = Track::new(id, roadmap.id, title, description)?
                .with_dependencies(depends_on)?;
            if let Some(rank) = rank {
                track = track.with_rank(rank)?;
            }
            let track = repo.create_track(track).await?;
            println!("Created track: {}", track.id);
        }
        TrackCommand::List { status } => {
            let roadmap = active_roadmap(repo).await?;
            let filter = TrackFilter {
                statuses: status,
                ..TrackFilter::for_roadmap(roadmap.id)
            };
            let tracks = repo.list_tracks(&filter).await?;
            println!("Tracks ({})", tracks.len());
            for track in &tracks {
                print_track_line(track);
            }
        }
        TrackCommand::Show { id } => {
            let aggregate = repo.get_track_with_tasks(&id).await?;
            let track = &aggregate.track;
            println!("Track: {}", track.id);
            println!("  Title: {}", track.title);
            println!("  Description: {}", track.description);
            println!("  Status: {}", track.status.as_str());
            println!("  Rank: {}", track.rank);
            println!("  Depends on: {}", track.dependencies.join(", "));
            println!("Tasks ({})", aggregate.tasks.len());
            for task in &aggregate.tasks {
                print_task_line(task);
            }
        }
        TrackCommand::Update { id, title, description, status, rank } => {
            let mut track = repo.get_track(&id).await?;
            if let Some(title) = title {
                track.title = title;
            }
            if let Some(description) = description {
                track.description = description;
            }
            if let Some(status) = status {
                track.status = status;
            }
            if let Some(rank) = rank {
                track.rank = rank;
            }
            let track = repo.update_track(track).await?;
            println!("Updated track: {} ({})", track.id, track.status.as_str());
        }
        TrackCommand::Depend { id, on } => {
            let track = repo.add_track_dependency(&id, &on).await?;
            println!("{} depends on: {}", track.id, track.dependencies.join(", "));
        }
        TrackCommand::Undepend { id, on } => {
            let track = repo.remove_track_dependency(&id, &on).await?;
            println!("{} depends on: {}", track.id, track.dependencies.join(", "));
        }
        TrackCommand::Move { id, direction } => {
            report_move(&id, move_track(repo, &id, direction.into()).await?);
        }
        TrackCommand::Delete { id } => {
            repo.delete_track(&id).await?;
            println!("Deleted track: {id}");
        }
    }
    Ok(())
}

async fn run_task(repo: &dyn Repository, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Create { track_id, title, description, rank, branch } => {
            let mut task = Task::new(track_id, title, description)?;
            if let Some(rank) = rank {
                task = task.with_rank(rank)?;
            }
            if let Some(branch) = branch {
                task = task.with_branch(branch);
            }
            let task = repo.create_task(task).await?;
            println!("Created task: {}", task.id);
        }
        TaskCommand::List { track, status } => {
            let tasks = repo
                .list_tasks(&TaskFilter { track_id: track, statuses: status })
                .await?;
            println!("Tasks ({})", tasks.len());
            for task in &tasks {
                print_task_line(task);
            }
        }
        TaskCommand::Show { id } => {
            let aggregate = repo.get_task_with_criteria(&id).await?;
            let task = &aggregate.task;
            println!("Task: {}", task.id);
            println!("  Track: {}", task.track_id);
            println!("  Title: {}", task.title);
            println!("  Description: {}", task.description);
            println!("  Status: {}", task.status.as_str());
            println!("  Rank: {}", task.rank);
            if let Some(branch) = &task.branch {
                println!("  Branch: {branch}");
            }
            let iterations = repo.list_iterations_for_task(&id).await?;
            if !iterations.is_empty() {
                let numbers: Vec<String> = iterations.iter().map(|i| i.number.to_string()).collect();
                println!("  Iterations: {}", numbers.join(", "));
            }
            println!("Acceptance criteria ({})", aggregate.criteria.len());
            for criterion in &aggregate.criteria {
                print_criterion_line(criterion);
            }
        }
        TaskCommand::Update { id, title, description, status, rank, branch } => {
            let mut task = repo.get_task(&id).await?;
            if let Some(title) = title {
                task.title = title;
            }
            if let Some(description) = description {
                task.description = description;
            }
            if let Some(status) = status {
                task.status = status;
            }
            if let Some(rank) = rank {
                task.rank = rank;
            }
            if let Some(branch) = branch {
                task.branch = Some(branch);
            }
            let task = repo.update_task(task).await?;
            println!("Updated task: {} ({})", task.id, task.status.as_str());
        }
        TaskCommand::MoveTrack { id, track_id } => {
            let task = repo.move_task_to_track(&id, &track_id).await?;
            println!("Moved task {} to {}", task.id, task.track_id);
        }
        TaskCommand::Move { id, direction } => {
            report_move(&id, move_task(repo, &id, direction.into()).await?);
        }
        TaskCommand::Backlog => {
            let tasks = repo.list_backlog_tasks().await?;
            println!("Backlog ({})", tasks.len());
            for task in &tasks {
                print_task_line(task);
            }
        }
        TaskCommand::Delete { id } => {
            repo.delete_task(&id).await?;
            println!("Deleted task: {id}");
        }
    }
    Ok(())
}

async fn run_iteration(repo: &dyn Repository, command: IterationCommand) -> Result<()> {
    match command {
        IterationCommand::Create { name, goal, deliverable, number } => {
            let iteration = repo
                .create_iteration(Iteration::new(number, name, goal, deliverable)?)
                .await?;
            println!("Created iteration: {}", iteration.number);
        }
        IterationCommand::List => {
            let iterations = repo.list_iterations().await?;
            println!("Iterations ({})", iterations.len());
            for iteration in &iterations {
                print_iteration_line(iteration);
            }
        }
        IterationCommand::Show { number } => {
            let iteration = repo.get_iteration(number).await?;
            print_iteration(repo, &iteration).await?;
        }
        IterationCommand::Current => match repo.get_current_iteration().await? {
            Some(iteration) => print_iteration(repo, &iteration).await?,
            None => println!("No current iteration"),
        },
        IterationCommand::Add { number, task_id } => {
            let iteration = repo.add_task_to_iteration(number, &task_id).await?;
            println!("Iteration {} tasks: {}", iteration.number, iteration.task_ids.join(", "));
        }
        IterationCommand::Remove { number, task_id } => {
            let iteration = repo.remove_task_from_iteration(number, &task_id).await?;
            println!("Iteration {} tasks: {}", iteration.number, iteration.task_ids.join(", "));
        }
        IterationCommand::Start { number } => {
            let iteration = repo.start_iteration(number).await?;
            println!("Started iteration {}", iteration.number);
        }
        IterationCommand::Complete { number } => {
            let iteration = repo.complete_iteration(number).await?;
            println!("Completed iteration {}", iteration.number);
        }
        IterationCommand::Move { number, direction } => {
            report_move(&number.to_string(), move_iteration(repo, number, direction.into()).await?);
        }
        IterationCommand::Delete { number } => {
            repo.delete_iteration(number).await?;
            println!("Deleted iteration: {number}");
        }
    }
    Ok(())
}

async fn run_ac(repo: &dyn Repository, command: AcCommand) -> Result<()> {
    match command {
        AcCommand::Add { task_id, description, automated, instructions } => {
            let verification = if automated {
                VerificationType::Automated
            } else {
                VerificationType::Manual
            };
            let mut criterion = AcceptanceCriterion::new(task_id, description, verification)?;
            if let Some(instructions) = instructions {
                criterion = criterion.with_testing_instructions(instructions);
            }
            let criterion = repo.create_criterion(criterion).await?;
            println!("Created acceptance criterion: {}", criterion.id);
        }
        AcCommand::List { task, track, iteration, status } => {
            let filter = CriterionFilter {
                task_id: task,
                track_id: track,
                iteration,
                statuses: status,
            };
            let criteria = repo.list_criteria(&filter).await?;
            println!("Acceptance criteria ({})", criteria.len());
            for criterion in &criteria {
                print_criterion_line(criterion);
            }
        }
        AcCommand::Verify { id, notes } => {
            let mut criterion = repo.get_criterion(&id).await?;
            criterion.verify(notes);
            report_criterion(repo.update_criterion(criterion).await?);
        }
        AcCommand::AutoVerify { id, notes } => {
            let mut criterion = repo.get_criterion(&id).await?;
            criterion.verify_automatically(notes);
            report_criterion(repo.update_criterion(criterion).await?);
        }
        AcCommand::Review { id } => {
            let mut criterion = repo.get_criterion(&id).await?;
            criterion.request_review();
            report_criterion(repo.update_criterion(criterion).await?);
        }
        AcCommand::Fail { id, reason } => {
            let mut criterion = repo.get_criterion(&id).await?;
            criterion.fail(reason);
            report_criterion(repo.update_criterion(criterion).await?);
        }
        AcCommand::Delete { id } => {
            repo.delete_criterion(&id).await?;
            println!("Deleted acceptance criterion: {id}");
        }
    }
    Ok(())
}

async fn run_adr(repo: &dyn Repository, command: AdrCommand) -> Result<()> {
    match command {
        AdrCommand::Create { track_id, title, context, decision, consequences, alternatives } => {
            let adr = Adr::new(track_id, title, context, decision, consequences)?
                .with_alternatives(alternatives);
            let adr = repo.create_adr(adr).await?;
            println!("Created ADR: {}", adr.id);
        }
        AdrCommand::List { track } => {
            let adrs = repo.list_adrs(track.as_deref()).await?;
            println!("ADRs ({})", adrs.len());
            for adr in &adrs {
                println!("  {} | {} | {} - {}", adr.id, adr.status.as_str(), adr.track_id, adr.title);
            }
        }
        AdrCommand::Show { id } => {
            let adr = repo.get_adr(&id).await?;
            println!("ADR: {}", adr.id);
            println!("  Track: {}", adr.track_id);
            println!("  Title: {}", adr.title);
            println!("  Status: {}", adr.status.as_str());
            if let Some(by) = &adr.superseded_by {
                println!("  Superseded by: {by}");
            }
            println!("  Context: {}", adr.context);
            println!("  Decision: {}", adr.decision);
            println!("  Consequences: {}", adr.consequences);
            if !adr.alternatives.is_empty() {
                println!("  Alternatives: {}", adr.alternatives);
            }
        }
        AdrCommand::Accept { id } => {
            let mut adr = repo.get_adr(&id).await?;
            adr.status = AdrStatus::Accepted;
            let adr = repo.update_adr(adr).await?;
            println!("ADR {} is {}", adr.id, adr.status.as_str());
        }
        AdrCommand::Supersede { id, by } => {
            let adr = repo.supersede_adr(&id, &by).await?;
            println!("ADR {} is superseded by {by}", adr.id);
        }
        AdrCommand::Deprecate { id } => {
            let adr = repo.deprecate_adr(&id).await?;
            println!("ADR {} is {}", adr.id, adr.status.as_str());
        }
    }
    Ok(())
}

async fn print_iteration(repo: &dyn Repository, iteration: &Iteration) -> Result<()> {
    println!("Iteration: {} - {}", iteration.number, iteration.name);
    println!("  Status: {}", iteration.status.as_str());
    println!("  Goal: {}", iteration.goal);
    println!("  Deliverable: {}", iteration.deliverable);
    if let Some(started) = iteration.started_at {
        println!("  Started: {started}");
    }
    if let Some(completed) = iteration.completed_at {
        println!("  Completed: {completed}");
    }
    let tasks = repo.get_iteration_tasks(iteration.number).await?;
    println!("Tasks ({})", tasks.len());
    for task in &tasks {
        print_task_line(task);
    }
    Ok(())
}

fn report_move(id: &str, moved: bool) {
    if moved {
        println!("Moved {id}");
    } else {
        println!("{id} is already at that end of the list");
    }
}

fn report_criterion(criterion: AcceptanceCriterion) {
    println!("Acceptance criterion {} is {}", criterion.id, criterion.status.as_str());
}

fn print_track_line(track: &Track) {
    let marker = if track.status == TrackStatus::Blocked { " !" } else { "" };
    println!(
        "  {} | {} | {} - {}{}",
        track.id,
        track.status.as_str(),
        track.rank,
        track.title,
        marker
    );
}

fn print_task_line(task: &Task) {
    println!(
        "  {} | {} | {} - {}",
        task.id,
        task.status.as_str(),
        task.rank,
        task.title
    );
}

fn print_iteration_line(iteration: &Iteration) {
    let marker = if iteration.status == IterationStatus::Current { " *" } else { "" };
    println!(
        "  {} | {} | {} tasks - {}{}",
        iteration.number,
        iteration.status.as_str(),
        iteration.task_ids.len(),
        iteration.name,
        marker
    );
}

fn print_criterion_line(criterion: &AcceptanceCriterion) {
    println!(
        "  {} | {} | {} - {}",
        criterion.id,
        criterion.status.as_str(),
        criterion.verification_type.as_str(),
        criterion.description
    );
    if !criterion.notes.is_empty() {
        println!("      notes: {}", criterion.notes);
    }
}
