/// Destructive action awaiting an explicit yes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    DeleteEvent { event_id: String },
    DeleteLegend { legend_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub title: String,
    pub message: String,
    pub action: ConfirmAction,
}

impl ConfirmRequest {
    pub fn delete_event(event_id: &str, legend_name: &str) -> Self {
        Self {
            title: "Delete event?".to_string(),
            message: format!(
                "Delete this \"{}\" event? This action cannot be undone.",
                legend_name
            ),
            action: ConfirmAction::DeleteEvent {
                event_id: event_id.to_string(),
            },
        }
    }

    pub fn delete_legend(legend_id: &str, legend_name: &str, event_count: usize) -> Self {
        let message = if event_count == 0 {
            format!("Delete the legend \"{}\"?", legend_name)
        } else {
            format!(
                "Delete the legend \"{}\" and the {} event(s) using it?",
                legend_name, event_count
            )
        };
        Self {
            title: "Delete legend?".to_string(),
            message,
            action: ConfirmAction::DeleteLegend {
                legend_id: legend_id.to_string(),
            },
        }
    }
}
