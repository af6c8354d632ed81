//! Command execution over a ready service.

use crate::Command;
use anyhow::Result;
use serde_json::json;
use std::io::Write;
use todolist_core::model::todo::format_timestamp;
use todolist_core::{TaskUpdate, TodoBackend, TodoItem, TodoService};

/// How a command ended, for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    NotFound,
}

pub(crate) fn run<B: TodoBackend>(
    command: Command,
    service: &TodoService<B>,
    json: bool,
    out: &mut impl Write,
) -> Result<Outcome> {
    match command {
        Command::List => {
            let tasks = service.get_all_tasks()?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&tasks)?)?;
            } else if tasks.is_empty() {
                writeln!(out, "No tasks found.")?;
            } else {
                writeln!(out, "\nTasks:\n------")?;
                for task in &tasks {
                    write_task(out, task)?;
                }
            }
            Ok(Outcome::Done)
        }

        Command::Add { title, completed } => {
            let task = service.add_task(title, completed)?;
            report(out, json, &task, &format!("Task added: {}", task.id))?;
            Ok(Outcome::Done)
        }

        Command::Complete { task_id } => {
            let update = TaskUpdate::default().completed(true);
            match service.update_task(&task_id, update)? {
                Some(task) => {
                    report(out, json, &task, &format!("Task completed: {}", task.id))?;
                    Ok(Outcome::Done)
                }
                None => not_found(out, &task_id),
            }
        }

        Command::Toggle { task_id } => match service.toggle_task(&task_id)? {
            Some(task) => {
                let status = if task.completed {
                    "completed"
                } else {
                    "incomplete"
                };
                report(
                    out,
                    json,
                    &task,
                    &format!("Task {} marked as {status}", task.id),
                )?;
                Ok(Outcome::Done)
            }
            None => not_found(out, &task_id),
        },

        Command::Update {
            task_id,
            title,
            completed,
        } => {
            let update = TaskUpdate { title, completed };
            match service.update_task(&task_id, update)? {
                Some(task) => {
                    report(out, json, &task, &format!("Task updated: {}", task.id))?;
                    Ok(Outcome::Done)
                }
                None => not_found(out, &task_id),
            }
        }

        Command::Show { task_id } => match service.get_task(&task_id)? {
            Some(task) if json => {
                writeln!(out, "{}", serde_json::to_string_pretty(&task)?)?;
                Ok(Outcome::Done)
            }
            Some(task) => {
                write_task(out, &task)?;
                writeln!(out, "  created_at: {}", format_timestamp(&task.created_at))?;
                writeln!(out, "  updated_at: {}", format_timestamp(&task.updated_at))?;
                Ok(Outcome::Done)
            }
            None => not_found(out, &task_id),
        },

        Command::Delete { task_id } => {
            if !service.delete_task(&task_id)? {
                return not_found(out, &task_id);
            }
            if json {
                let body = json!({ "id": task_id, "deleted": true });
                writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
            } else {
                writeln!(out, "Task deleted: {task_id}")?;
            }
            Ok(Outcome::Done)
        }
    }
}

fn write_task(out: &mut impl Write, task: &TodoItem) -> std::io::Result<()> {
    let status = if task.completed { "✓" } else { "☐" };
    writeln!(out, "{}: [{status}] {}", task.id, task.title)
}

fn report(out: &mut impl Write, json: bool, task: &TodoItem, headline: &str) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(task)?)?;
    } else {
        writeln!(out, "{headline}")?;
        write_task(out, task)?;
    }
    Ok(())
}

fn not_found(out: &mut impl Write, task_id: &str) -> Result<Outcome> {
    writeln!(out, "Task not found: {task_id}")?;
    Ok(Outcome::NotFound)
}
