use crate::logger;

/// Prints an error together with its cause chain.
pub fn log_error(error: &anyhow::Error) {
    logger::error(error.to_string());

    if error.chain().count() > 1 {
        logger::error_note(
            "Caused by:",
            &error
                .chain()
                .skip(1)
                .enumerate()
                .map(|(i, cause)| format!("  {i}: {}", cause))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
}
