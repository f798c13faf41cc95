use colored::*;
use log::error;
use nilo_studio::engine::{ActionContext, PreviewSession, RuntimeResult};
use nilo_studio::ui::WidgetTree;
use nilo_studio::{init_logger, load_project, parse_args, show_help};

fn print_result(label: &str, result: &RuntimeResult) {
    let status = if result.success {
        "ok".green().bold()
    } else {
        "failed".red().bold()
    };
    println!("{} {}", format!("[{}]", label).cyan(), status);
    if let Some(err) = &result.error {
        println!("    {}", err.red());
    }
    for (path, value) in &result.changes {
        println!("    {} = {}", path.yellow(), value);
    }
    for effect in &result.effects {
        let text = serde_json::to_string(effect).unwrap_or_default();
        println!("    {} {}", "effect".magenta(), text);
    }
}

#[tokio::main]
async fn main() {
    let cli_args = parse_args();
    init_logger(&cli_args.log_level);

    let Some(path) = cli_args.project_path.clone() else {
        show_help();
        std::process::exit(2);
    };

    let mut project = match load_project(&path, cli_args.enable_lint, cli_args.quiet) {
        Ok(project) => project,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e.to_string().red());
            std::process::exit(1);
        }
    };
    cli_args.apply_overrides(&mut project.runtime);

    let mut session = PreviewSession::new(&project);
    let ctx = ActionContext::new();
    let mut all_ok = true;

    let loaded = session.load_screen(&ctx).await;
    all_ok &= loaded.success;
    print_result("load", &loaded);

    if let Some(event_id) = &cli_args.event_id {
        match session.fire_event_by_id(event_id, &ctx).await {
            Some(result) => {
                all_ok &= result.success;
                print_result(&format!("event {}", event_id), &result);
            }
            None => {
                all_ok = false;
                println!("{}", format!("event '{}' not found", event_id).red());
            }
        }
    }

    if let Some(kind) = cli_args.trigger {
        let result = session.trigger(kind, cli_args.element_id.as_deref(), &ctx).await;
        all_ok &= result.success;
        print_result(&format!("trigger {:?}", kind), &result);
    }

    if let Some(name) = &cli_args.emit {
        let result = session.fire_custom(name, cli_args.payload.clone()).await;
        all_ok &= result.success;
        print_result(&format!("emit {}", name), &result);
    }

    println!("\n{}", "state".bold());
    println!(
        "{}",
        serde_json::to_string_pretty(session.state()).unwrap_or_default()
    );

    println!("\n{}", "event log".bold());
    for entry in session.event_log() {
        let line = format!(
            "{}{} [{:?}] {:?}",
            "  ".repeat(entry.depth),
            entry.event_id,
            entry.trigger,
            entry.result
        );
        match &entry.error {
            Some(err) => println!("{} {}", line.red(), err),
            None => println!("{}", line),
        }
    }

    if cli_args.show_layout {
        let mut tree = WidgetTree::from_widgets(project.widgets.clone());
        tree.relayout_all();
        let roots = tree.roots().to_vec();

        println!("\n{}", "layout".bold());
        let mut stack: Vec<(String, usize)> = roots.into_iter().rev().map(|r| (r, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(widget) = tree.get(&id) else {
                continue;
            };
            println!(
                "{}{} ({}) x={} y={} w={} h={}",
                "  ".repeat(depth),
                widget.id.cyan(),
                widget.widget_type,
                widget.position.x,
                widget.position.y,
                widget.size.width,
                widget.size.height
            );
            for child in tree.children_of(&id).into_iter().rev() {
                stack.push((child.id.clone(), depth + 1));
            }
        }
    }

    if !all_ok {
        std::process::exit(1);
    }
}
