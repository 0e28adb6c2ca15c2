use crate::analyzer::aggregate::{MonthThemeRow, SongStat, SunsetThemeRow, TemperatureThemeRow};
use crate::analyzer::theme::Season;
use anyhow::{Result, anyhow};
use plotters::prelude::*;
use std::error::Error;
use std::path::Path;

const SIZE: (u32, u32) = (1280, 720);
const BAR_HALF_WIDTH: f64 = 0.35;
const TEMPERATURE_COLOR: RGBColor = RGBColor(214, 39, 40);

type DrawResult = std::result::Result<(), Box<dyn Error>>;

struct StackedLayer {
    season: Season,
    values: Vec<u32>,
}

pub fn season_color(season: Season) -> RGBColor {
    match season {
        Season::Winter => RGBColor(70, 130, 180),
        Season::Summer => RGBColor(255, 165, 0),
        Season::Fall => RGBColor(205, 133, 63),
        Season::Spring => RGBColor(60, 179, 113),
        Season::Other => RGBColor(160, 160, 160),
    }
}

/// Average temperature on the left axis, winter/summer playlist counts on the right.
pub fn temperature_themes(path: &Path, rows: &[TemperatureThemeRow]) -> Result<()> {
    draw_temperature_themes(path, rows).map_err(|error| render_error(path, error))
}

/// Days at number one as bars, mean temperature on those days as a line.
pub fn chart_longevity(path: &Path, stats: &[SongStat]) -> Result<()> {
    draw_chart_longevity(path, stats).map_err(|error| render_error(path, error))
}

pub fn theme_months(path: &Path, rows: &[MonthThemeRow]) -> Result<()> {
    let months = rows.iter().map(|row| row.month.clone()).collect::<Vec<_>>();
    let layers = [
        (Season::Winter, rows.iter().map(|row| row.winter).collect()),
        (Season::Summer, rows.iter().map(|row| row.summer).collect()),
        (Season::Spring, rows.iter().map(|row| row.spring).collect()),
        (Season::Fall, rows.iter().map(|row| row.fall).collect()),
    ]
    .into_iter()
    .map(|(season, values)| StackedLayer { season, values })
    .collect::<Vec<_>>();

    draw_stacked_bars(
        path,
        "Seasonal playlists added per month",
        "Month",
        &months,
        &layers,
    )
    .map_err(|error| render_error(path, error))
}

pub fn sunset_themes(path: &Path, rows: &[SunsetThemeRow]) -> Result<()> {
    let bins = rows
        .iter()
        .map(|row| row.sunset_bin.clone())
        .collect::<Vec<_>>();
    let layers = [
        (Season::Winter, rows.iter().map(|row| row.winter).collect()),
        (Season::Summer, rows.iter().map(|row| row.summer).collect()),
        (Season::Fall, rows.iter().map(|row| row.fall).collect()),
        (Season::Other, rows.iter().map(|row| row.other).collect()),
    ]
    .into_iter()
    .map(|(season, values)| StackedLayer { season, values })
    .collect::<Vec<_>>();

    draw_stacked_bars(
        path,
        "Playlist themes by sunset time",
        "Average sunset of the month",
        &bins,
        &layers,
    )
    .map_err(|error| render_error(path, error))
}

fn render_error(path: &Path, error: Box<dyn Error>) -> anyhow::Error {
    anyhow!("Failed to render {}: {error}", path.display())
}

fn draw_temperature_themes(path: &Path, rows: &[TemperatureThemeRow]) -> DrawResult {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let months = rows.iter().map(|row| row.month.clone()).collect::<Vec<_>>();
    let x_range = category_range(rows.len());
    let (temp_min, temp_max) = padded_range(rows.iter().filter_map(|row| row.avg_temp));
    let count_max = rows
        .iter()
        .map(|row| row.winter.max(row.summer))
        .max()
        .unwrap_or_default();

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Monthly temperature vs seasonal playlists",
            ("sans-serif", 28),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(x_range.clone(), temp_min..temp_max)?
        .set_secondary_coord(x_range, 0.0..f64::from(count_max) + 1.0);

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(rows.len())
        .x_label_formatter(&|x: &f64| category_label(&months, *x))
        .x_desc("Month")
        .y_desc("Average temperature (°C)")
        .light_line_style(BLACK.mix(0.1))
        .draw()?;

    chart
        .configure_secondary_axes()
        .y_desc("Playlists added")
        .draw()?;

    chart
        .draw_series(
            present_segments(rows.iter().map(|row| row.avg_temp))
                .into_iter()
                .map(|segment| PathElement::new(segment, TEMPERATURE_COLOR)),
        )?
        .label("Average temperature")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], TEMPERATURE_COLOR));

    for (season, counts) in [
        (
            Season::Winter,
            rows.iter().map(|row| row.winter).collect::<Vec<_>>(),
        ),
        (
            Season::Summer,
            rows.iter().map(|row| row.summer).collect::<Vec<_>>(),
        ),
    ] {
        let color = season_color(season);
        chart
            .draw_secondary_series(LineSeries::new(
                counts
                    .into_iter()
                    .enumerate()
                    .map(|(index, count)| (index as f64, f64::from(count))),
                color,
            ))?
            .label(format!("{season} playlists"))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_chart_longevity(path: &Path, stats: &[SongStat]) -> DrawResult {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let labels = stats
        .iter()
        .map(|stat| stat.label.clone())
        .collect::<Vec<_>>();
    let x_range = category_range(stats.len());
    let days_max = stats
        .iter()
        .map(|stat| stat.days_at_one)
        .max()
        .unwrap_or_default();
    let (temp_min, temp_max) = padded_range(stats.iter().filter_map(|stat| stat.avg_temp_at_one));
    let bar_color = season_color(Season::Winter);

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Longest-running number ones and the weather",
            ("sans-serif", 28),
        )
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(x_range.clone(), 0.0..f64::from(days_max) + 1.0)?
        .set_secondary_coord(x_range, temp_min..temp_max);

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(stats.len())
        .x_label_formatter(&|x: &f64| category_label(&labels, *x))
        .x_label_style(("sans-serif", 11))
        .y_desc("Days at number one")
        .light_line_style(BLACK.mix(0.1))
        .draw()?;

    chart
        .configure_secondary_axes()
        .y_desc("Average temperature (°C)")
        .draw()?;

    chart
        .draw_series(stats.iter().enumerate().map(|(index, stat)| {
            let x = index as f64;
            Rectangle::new(
                [
                    (x - BAR_HALF_WIDTH, 0.0),
                    (x + BAR_HALF_WIDTH, f64::from(stat.days_at_one)),
                ],
                bar_color.mix(0.7).filled(),
            )
        }))?
        .label("Days at number one")
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], bar_color.filled()));

    chart
        .draw_secondary_series(LineSeries::new(
            stats
                .iter()
                .enumerate()
                .filter_map(|(index, stat)| stat.avg_temp_at_one.map(|temp| (index as f64, temp))),
            TEMPERATURE_COLOR,
        ))?
        .label("Average temperature")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], TEMPERATURE_COLOR));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_stacked_bars(
    path: &Path,
    caption: &str,
    x_desc: &str,
    categories: &[String],
    layers: &[StackedLayer],
) -> DrawResult {
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let totals = stacked_totals(categories.len(), layers);
    let top = totals.iter().copied().max().unwrap_or_default();

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(
            category_range(categories.len()),
            0.0..(f64::from(top) * 1.1).max(1.0),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(categories.len())
        .x_label_formatter(&|x: &f64| category_label(categories, *x))
        .x_desc(x_desc)
        .y_desc("Playlists")
        .light_line_style(BLACK.mix(0.1))
        .draw()?;

    let mut base = vec![0_u32; categories.len()];
    for layer in layers {
        let color = season_color(layer.season);
        let bars = base
            .iter()
            .zip(&layer.values)
            .enumerate()
            .map(|(index, (bottom, value))| {
                let x = index as f64;
                Rectangle::new(
                    [
                        (x - BAR_HALF_WIDTH, f64::from(*bottom)),
                        (x + BAR_HALF_WIDTH, f64::from(bottom + value)),
                    ],
                    color.filled(),
                )
            })
            .collect::<Vec<_>>();

        chart
            .draw_series(bars)?
            .label(layer.season.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

        for (bottom, value) in base.iter_mut().zip(&layer.values) {
            *bottom += value;
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn category_range(count: usize) -> std::ops::Range<f64> {
    -0.5..(count.max(1) as f64 - 0.5)
}

/// Label for integer axis positions; fractional ticks stay blank.
fn category_label(labels: &[String], x: f64) -> String {
    let rounded = x.round();
    if (x - rounded).abs() > 0.01 || rounded < 0.0 {
        return String::new();
    }

    labels.get(rounded as usize).cloned().unwrap_or_default()
}

/// Splits a category series into runs of known values; a missing value leaves a gap.
fn present_segments(values: impl Iterator<Item = Option<f64>>) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();

    for (index, value) in values.enumerate() {
        match value {
            Some(value) => current.push((index as f64, value)),
            None => segments.push(std::mem::take(&mut current)),
        }
    }
    segments.push(current);

    segments.retain(|segment| !segment.is_empty());
    segments
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
        (min.min(value), max.max(value))
    });

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }

    let padding = if (max - min).abs() > 1e-6 {
        (max - min) * 0.1
    } else {
        1.0
    };
    (min - padding, max + padding)
}

fn stacked_totals(count: usize, layers: &[StackedLayer]) -> Vec<u32> {
    let mut totals = vec![0_u32; count];
    for layer in layers {
        for (total, value) in totals.iter_mut().zip(&layer.values) {
            *total += value;
        }
    }
    totals
}
