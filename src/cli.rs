use std::{
    env,
    io::{self, BufRead, Write},
    process::{Command as PagerCommand, Stdio},
    sync::Arc,
};

use anyhow::{Context, anyhow, bail};
use chrono::{Local, NaiveDate};

use palette_calendar::{
    access::Identity,
    app::{CalendarSession, SessionOptions},
    calendar::{Event, Legend, YearMonth, create_calendar, normalize_day, provision_own_calendar},
    input::{SelectionIntent, strip_html},
    route::{calendar_path, resolve_calendar_id},
    storage::{SharedStore, SqliteStore, config::Config, paths},
};

const USAGE: &str = "Usage:
  palette-calendar create NAME
  palette-calendar agenda [PATH|ID] [YYYY/MM]
  palette-calendar legend PATH|ID NAME [COLOR]
  palette-calendar event PATH|ID START END LEGEND
  palette-calendar move PATH|ID EVENT_ID START END
  palette-calendar memo PATH|ID YYYY/MM TEXT
  palette-calendar delete-event PATH|ID EVENT_ID
  palette-calendar delete-legend PATH|ID LEGEND";

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Create { name: String },
    Agenda { target: Option<String>, month: Option<YearMonth> },
    Legend { target: String, name: String, color: Option<String> },
    Event { target: String, start: NaiveDate, end: NaiveDate, legend: String },
    Move { target: String, event_id: String, start: NaiveDate, end: NaiveDate },
    Memo { target: String, month: YearMonth, text: String },
    DeleteEvent { target: String, event_id: String },
    DeleteLegend { target: String, legend: String },
    Help,
}

pub fn usage() -> &'static str {
    USAGE
}

pub fn parse_cli_command() -> Result<CliCommand, String> {
    parse_args(env::args().skip(1))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliCommand, String> {
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(CliCommand::Agenda { target: None, month: None });
    };
    let rest: Vec<String> = args.collect();

    let command = match (command.as_str(), rest.as_slice()) {
        ("--help" | "-h" | "help", _) => CliCommand::Help,
        ("create", [name, ..]) => CliCommand::Create { name: name.clone() },
        ("agenda", []) => CliCommand::Agenda { target: None, month: None },
        ("agenda", [one]) => match YearMonth::parse(one) {
            Some(month) => CliCommand::Agenda { target: None, month: Some(month) },
            None => CliCommand::Agenda { target: Some(one.clone()), month: None },
        },
        ("agenda", [target, month, ..]) => CliCommand::Agenda {
            target: Some(target.clone()),
            month: Some(parse_month(month)?),
        },
        ("legend", [target, name, rest @ ..]) => CliCommand::Legend {
            target: target.clone(),
            name: name.clone(),
            color: rest.first().cloned(),
        },
        ("event", [target, start, end, legend, ..]) => CliCommand::Event {
            target: target.clone(),
            start: parse_day(start)?,
            end: parse_day(end)?,
            legend: legend.clone(),
        },
        ("move", [target, event_id, start, end, ..]) => CliCommand::Move {
            target: target.clone(),
            event_id: event_id.clone(),
            start: parse_day(start)?,
            end: parse_day(end)?,
        },
        ("memo", [target, month, text @ ..]) if !text.is_empty() => CliCommand::Memo {
            target: target.clone(),
            month: parse_month(month)?,
            text: text.join(" "),
        },
        ("delete-event", [target, event_id, ..]) => CliCommand::DeleteEvent {
            target: target.clone(),
            event_id: event_id.clone(),
        },
        ("delete-legend", [target, legend, ..]) => CliCommand::DeleteLegend {
            target: target.clone(),
            legend: legend.clone(),
        },
        (other, _) => return Err(format!("Unknown or incomplete command: {}", other)),
    };
    Ok(command)
}

fn parse_day(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y/%m/%d")
        .ok()
        .or_else(|| normalize_day(value))
        .ok_or_else(|| format!("Invalid date '{}'. Use YYYY/MM/DD.", value))
}

fn parse_month(value: &str) -> Result<YearMonth, String> {
    YearMonth::parse(value).ok_or_else(|| format!("Invalid month '{}'. Use YYYY/MM.", value))
}

pub async fn run(command: CliCommand, config: &Config) -> anyhow::Result<()> {
    let identity = config.identity();
    let store: SharedStore = Arc::new(
        SqliteStore::open(&config.store.database)
            .with_context(|| format!("opening {}", config.store.database.display()))?,
    );
    let options = SessionOptions::from_config(config)?;

    match command {
        CliCommand::Help => println!("{USAGE}"),
        CliCommand::Create { name } => {
            let calendar_id = create_calendar(store.as_ref(), &name, &identity).await?;
            println!("Created \"{}\" at {}", name.trim(), calendar_path(&calendar_id));
        }
        CliCommand::Agenda { target, month } => {
            let calendar_id = target_calendar(&store, target.as_deref(), &identity).await?;
            let month = month.unwrap_or_else(|| YearMonth::of(Local::now().date_naive()));
            let mut session = open(&store, &calendar_id, &identity, options.with_month(month)).await?;

            let mut memos = Vec::new();
            for month in session.visible_months() {
                let memo = store
                    .get(&paths::monthly_memo(&calendar_id, month))
                    .await?
                    .and_then(|doc| doc.str_field("content").map(strip_html))
                    .unwrap_or_default();
                memos.push(memo);
            }

            let agenda = format_agenda_text(&session, &memos);
            session.close();
            display_with_pager(&agenda)?;
        }
        CliCommand::Legend { target, name, color } => {
            let mut session = open_target(&store, &target, &identity, options).await?;
            match session.add_legend(&name, color.as_deref()).await {
                Some(id) => println!("Added legend {} ({})", name.trim(), id),
                None => eprintln!("Legend not added"),
            }
            session.close();
        }
        CliCommand::Event { target, start, end, legend } => {
            let month = YearMonth::of(start);
            let mut session = open_target(&store, &target, &identity, options.with_month(month)).await?;
            let legend_id = find_legend(&session.legends(), &legend)
                .ok_or_else(|| anyhow!("No legend named {}", legend))?;

            session.activate_day(start).await;
            match session.activate_day(end).await {
                Some(SelectionIntent::PromptLegend { .. }) => {}
                other => bail!("Unexpected selection result: {:?}", other),
            }
            match session.choose_legend(&legend_id).await {
                Some(id) => println!("Created event {}", id),
                None => eprintln!("Event not created"),
            }
            session.close();
        }
        CliCommand::Move { target, event_id, start, end } => {
            let mut session = open_target(&store, &target, &identity, options).await?;
            if !session.start_edit(&event_id) {
                bail!("No event {}", event_id);
            }
            session.activate_day(start).await;
            if let Some(SelectionIntent::Reposition { start, end, .. }) =
                session.activate_day(end).await
            {
                println!("Moved {} to {} - {}", event_id, start, end);
            }
            session.close();
        }
        CliCommand::Memo { target, month, text } => {
            let mut session = open_target(&store, &target, &identity, options.with_month(month)).await?;
            if let Some(memo) = session.memo() {
                memo.wait_loaded().await;
            }
            session.edit_memo(&text);
            session.shutdown().await;
        }
        CliCommand::DeleteEvent { target, event_id } => {
            let mut session = open_target(&store, &target, &identity, options).await?;
            if !session.request_delete_event(&event_id) {
                bail!("No event {}", event_id);
            }
            confirm_pending(&mut session).await?;
            session.close();
        }
        CliCommand::DeleteLegend { target, legend } => {
            let mut session = open_target(&store, &target, &identity, options).await?;
            let legend_id = find_legend(&session.legends(), &legend)
                .ok_or_else(|| anyhow!("No legend named {}", legend))?;
            session.request_delete_legend(&legend_id);
            confirm_pending(&mut session).await?;
            session.close();
        }
    }

    Ok(())
}

async fn target_calendar(
    store: &SharedStore,
    target: Option<&str>,
    identity: &Identity,
) -> anyhow::Result<String> {
    let calendar_id = resolve_calendar_id(target, identity)?;
    if calendar_id == identity.uid {
        let name = format!("{}'s calendar", identity.display_name);
        provision_own_calendar(store.as_ref(), &name, identity).await?;
    }
    Ok(calendar_id)
}

async fn open_target(
    store: &SharedStore,
    target: &str,
    identity: &Identity,
    options: SessionOptions,
) -> anyhow::Result<CalendarSession> {
    let calendar_id = target_calendar(store, Some(target), identity).await?;
    open(store, &calendar_id, identity, options).await
}

async fn open(
    store: &SharedStore,
    calendar_id: &str,
    identity: &Identity,
    options: SessionOptions,
) -> anyhow::Result<CalendarSession> {
    let session = CalendarSession::open(store.clone(), calendar_id, identity, options).await?;
    session.refresh().await?;
    if !session.is_owner() {
        eprintln!("Viewing {} read-only", calendar_path(calendar_id));
    }
    Ok(session)
}

fn find_legend(legends: &[Legend], wanted: &str) -> Option<String> {
    legends
        .iter()
        .find(|legend| legend.id == wanted)
        .or_else(|| legends.iter().find(|legend| legend.name.eq_ignore_ascii_case(wanted.trim())))
        .map(|legend| legend.id.clone())
}

async fn confirm_pending(session: &mut CalendarSession) -> anyhow::Result<()> {
    let Some(request) = session.pending_confirm() else {
        return Ok(());
    };
    print!("{}\n{} [y/N] ", request.title, request.message);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    if answer.trim().eq_ignore_ascii_case("y") {
        session.confirm().await;
    } else {
        session.dismiss_confirm();
        println!("Cancelled");
    }
    Ok(())
}

fn format_agenda_text(session: &CalendarSession, memos: &[String]) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{} – {}", session.info().name, calendar_path(session.calendar_id())));

    let events = session.events();
    for (month, memo) in session.visible_months().into_iter().zip(memos) {
        lines.push(String::new());
        lines.push(month.first_day().format("%B %Y").to_string());

        let in_month: Vec<&Event> = events
            .iter()
            .filter(|event| event.start_date <= month.last_day() && event.end_date >= month.first_day())
            .collect();
        if in_month.is_empty() {
            lines.push("No events scheduled.".to_string());
        }
        for event in in_month {
            lines.push(format!("- {}", build_agenda_line(session, event)));
        }

        let memo = memo.trim();
        if !memo.is_empty() {
            lines.push(String::new());
            lines.extend(memo.lines().map(|line| format!("  {}", line)));
        }
    }

    lines.join("\n")
}

fn build_agenda_line(session: &CalendarSession, event: &Event) -> String {
    let legend = session.event_store().read().resolve_legend(&event.legend_id);
    let dates = if event.start_date == event.end_date {
        event.start_date.format("%m/%d").to_string()
    } else {
        format!("{}-{}", event.start_date.format("%m/%d"), event.end_date.format("%m/%d"))
    };

    let mut line = format!("{:<12} [{}] {}", dates, legend.color, legend.name);
    if !event.memo.is_empty() {
        line.push_str(&format!(": {}", event.memo));
    }
    line
}

fn display_with_pager(text: &str) -> Result<(), io::Error> {
    let pager_value = env::var("PAGER").unwrap_or_else(|_| "less".to_string());
    let mut parts = pager_value.split_whitespace();
    let cmd = match parts.next() {
        Some(c) => c,
        None => {
            println!("{text}");
            return Ok(());
        }
    };
    let args: Vec<&str> = parts.collect();

    match PagerCommand::new(cmd)
        .args(&args)
        .stdin(Stdio::piped())
        .spawn()
    {
        Ok(mut child) => {
            if let Some(stdin) = child.stdin.as_mut() {
                stdin.write_all(text.as_bytes())?;
            }
            let _ = child.wait();
        }
        Err(_) => {
            println!("{text}");
        }
    }

    Ok(())
}
