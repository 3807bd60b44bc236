use nu_ansi_term::{Color, Style};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Colorized output for local development.
pub struct PrettyLogFormat;

fn styled(
    writer: &mut Writer<'_>,
    style: Style,
    text: impl std::fmt::Display,
) -> std::fmt::Result {
    write!(writer, "{}{}{}", style.prefix(), text, style.suffix())
}

fn level_style(level: &Level) -> Style {
    match *level {
        Level::TRACE => Style::new().fg(Color::Purple),
        Level::DEBUG => Style::new().fg(Color::Blue),
        Level::INFO => Style::new().fg(Color::Green),
        Level::WARN => Style::new().fg(Color::Yellow),
        Level::ERROR => Style::new().fg(Color::Red),
    }
}

impl<S, N> FormatEvent<S, N> for PrettyLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let timestamp = chrono::offset::Local::now().format("%T%.3f");
        styled(&mut writer, Style::new().dimmed(), format_args!("{} ", timestamp))?;
        styled(
            &mut writer,
            level_style(metadata.level()),
            format_args!("{:<5}", metadata.level()),
        )?;

        let depth = ctx.event_scope().map_or(0, |scope| scope.count());
        styled(
            &mut writer,
            Style::new().fg(Color::Magenta),
            format_args!(" {} ", "|".repeat(depth)),
        )?;

        let mut fields = String::new();
        ctx.field_format()
            .format_fields(Writer::new(&mut fields), event)?;

        // Span creation is reported as an event with the single field "new".
        if metadata.is_span()
            && fields == "new"
            && let Some(span) = ctx.event_scope().and_then(|mut scope| scope.next())
        {
            styled(&mut writer, Style::new().fg(Color::Magenta), "=> ")?;
            styled(
                &mut writer,
                Style::new().dimmed(),
                format_args!("{}: ", metadata.target()),
            )?;
            write!(writer, "{}", span.name())?;
            if let Some(span_fields) = span.extensions().get::<FormattedFields<N>>()
                && !span_fields.is_empty()
            {
                write!(writer, "{{{}}}", span_fields)?;
            }
        } else {
            styled(
                &mut writer,
                Style::new().dimmed(),
                format_args!("{}: ", metadata.target()),
            )?;
            write!(writer, "{}", fields)?;
        }

        writeln!(writer)
    }
}
