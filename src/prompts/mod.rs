//! D3.js prompt construction.
//!
//! Every branch is literal text. `raw_data` is interpolated verbatim; a value
//! containing a backtick closes the JavaScript template literal early and
//! corrupts the prompt.

use crate::conversation::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You are an expert D3.js developer. Your task is to generate a complete, \
self-contained D3.js script (without the script tags) to visualize the provided data. \
The script must handle its own data parsing and rendering.";

pub const CHART_LABELS: &[&str] = &["Bar Chart", "Pie Chart"];
pub const DATA_LABELS: &[&str] = &["JSON", "CSV"];

const BAR_JSON_STEPS: &str =
    "1. The JSON data is provided in a constant named `jsonData`. Parse it using `JSON.parse()`.\n";

const BAR_CSV_STEPS: &str = "1. The CSV data is provided in a constant named `csvData`. Parse it using `d3.csvParse()`.\n\
2. **MOST IMPORTANT STEP:** After parsing, convert the 'value' strings to numbers using this exact code: `data.forEach(d => { d.value = +d.value; });`.\n";

const BAR_RENDER_STEPS: &str = "3. Define margins, and an inner `width` and `height`.\n\
4. Select `d3.select('#d3-container')` and append an SVG.\n\
5. **CRITICAL: You MUST set the SVG's dimensions to include the margins.** Use this exact code: `.attr('width', width + margin.left + margin.right).attr('height', height + margin.top + margin.bottom)`.\n\
6. After setting the dimensions, append a `<g>` element and `transform` it by the margins.\n\
7. Create scales. The `yScale`'s range MUST be `[height, 0]`.\n\
8. Render the x-axis and y-axis.\n\
9. Bind the data and append rectangles with the correct `x`, `y`, `width`, and `height` attributes, where height is `height - yScale(d.value)`.\n\
Do not include any HTML or CSS, only the standalone Javascript code.";

const PIE_JSON_FORMAT: &str =
    "The data is provided as a single JSON string. The script should parse it before use.\n\n";

const PIE_CSV_FORMAT: &str = "The data is provided as a single CSV string.\n\
The script must perform these initial data-loading steps:\n\
1. Parse the provided CSV string into an array of objects. **You MUST use `d3.csvParse()` for this.**\n\
2. After parsing, you MUST iterate through the data and convert the numeric 'value' column to a number, for example: `data.forEach(d => { d.value = +d.value; });` This is a critical step.\n\n";

const PIE_RENDER_STEPS: &str = "The script must then follow these exact rendering instructions:\n\
1. Define width and height.\n\
2. Create a `d3.pie()` layout. Define it exactly like this: `const pie = d3.pie().sort(null).value(d => d.value);`\n\
3. Create the SVG and set its viewBox exactly like this: `.attr('viewBox', [-width / 2, -height / 2, width, height])`.\n\
4. Create two arc generators: `arc` for slices and `arcLabel` for label positions.\n\
5. First, append a `<g>` for slices and append paths to it. Do not use a transform on this group.\n\
6. Second, append a NEW, SEPARATE `<g>` for labels with `text-anchor: 'middle'`.\n\
7. In this label group, join data and append `<text>` elements with the transform `d => `translate(${arcLabel.centroid(d)})`.\n\
8. Use `.call()` to append two `<tspan>` elements with the following exact attributes:\n   \
a. The first tspan for the category: `.append('tspan').attr('y', '-0.4em').attr('font-weight', 'bold').text(d => d.data.category)`\n   \
b. The second tspan for the value: `.append('tspan').attr('x', 0).attr('y', '0.7em').attr('fill-opacity', 0.7).text(d => d.data.value)`\n\
Do not include any HTML or CSS, only the standalone Javascript code.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartType {
    Bar,
    Pie,
}

impl ChartType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Bar Chart" => Some(Self::Bar),
            "Pie Chart" => Some(Self::Pie),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bar => "Bar Chart",
            Self::Pie => "Pie Chart",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataType {
    #[default]
    Json,
    Csv,
}

impl DataType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "JSON" => Some(Self::Json),
            "CSV" => Some(Self::Csv),
            _ => None,
        }
    }
}

fn data_block(raw_data: &str, data_type: DataType) -> String {
    match data_type {
        DataType::Csv => format!("const csvData = `\n{raw_data}\n`;"),
        DataType::Json => format!("const jsonData = `{raw_data}`;"),
    }
}

/// The user turn for a chart request. `None` yields an empty instruction.
pub fn chart_instruction(raw_data: &str, chart: Option<ChartType>, data_type: DataType) -> String {
    let Some(chart) = chart else {
        return String::new();
    };

    let data = data_block(raw_data, data_type);
    let label = chart.label();

    match chart {
        ChartType::Bar => {
            let steps = match data_type {
                DataType::Csv => BAR_CSV_STEPS,
                DataType::Json => BAR_JSON_STEPS,
            };
            format!(
                "Generate a D3.js script to create a {label}. The script must be self-contained and perform these exact steps:\n\
                 // Data Definition:\n{data}\n\n\
                 // D3.js Implementation Steps:\n\
                 {steps}{BAR_RENDER_STEPS}"
            )
        }
        ChartType::Pie => {
            let format_notes = match data_type {
                DataType::Csv => PIE_CSV_FORMAT,
                DataType::Json => PIE_JSON_FORMAT,
            };
            format!(
                "Generate a D3.js script to create an advanced {label} from the following data:\n\
                 {data}\n\
                 {format_notes}{PIE_RENDER_STEPS}"
            )
        }
    }
}

/// System persona plus chart instruction, ready for the chat template.
pub fn d3_conversation(raw_data: &str, chart: Option<ChartType>, data_type: DataType) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(chart_instruction(raw_data, chart, data_type)),
    ]
}

/// Label-based entry point that never fails: unknown chart types produce an
/// empty instruction and unknown data types are treated as JSON.
pub fn d3_conversation_lenient(raw_data: &str, chart_type: &str, data_type: &str) -> Vec<ChatMessage> {
    d3_conversation(
        raw_data,
        ChartType::from_label(chart_type),
        DataType::from_label(data_type).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "category,value\nA,10\nB,20";
    const JSON: &str = r#"[{"category":"A","value":10}]"#;

    #[test]
    fn bar_csv_coerces_value_and_skips_json_parse() {
        let prompt = chart_instruction(CSV, Some(ChartType::Bar), DataType::Csv);
        assert!(prompt.contains("data.forEach(d => { d.value = +d.value; });"));
        assert!(prompt.contains("d3.csvParse()"));
        assert!(!prompt.contains("JSON.parse()"));
        assert!(prompt.contains("const csvData = `\ncategory,value\nA,10\nB,20\n`;"));
        assert!(prompt.starts_with("Generate a D3.js script to create a Bar Chart."));
    }

    #[test]
    fn bar_json_uses_json_parse() {
        let prompt = chart_instruction(JSON, Some(ChartType::Bar), DataType::Json);
        assert!(prompt.contains("Parse it using `JSON.parse()`"));
        assert!(prompt.contains(&format!("const jsonData = `{JSON}`;")));
        assert!(!prompt.contains("d3.csvParse"));
        assert!(prompt.contains("The `yScale`'s range MUST be `[height, 0]`."));
        assert!(prompt.contains("where height is `height - yScale(d.value)`"));
        assert!(prompt.ends_with("only the standalone Javascript code."));
    }

    #[test]
    fn pie_json_has_layout_and_tspans_without_csv() {
        let prompt = chart_instruction(JSON, Some(ChartType::Pie), DataType::Json);
        assert!(prompt.contains("const pie = d3.pie().sort(null).value(d => d.value);"));
        assert!(prompt.contains(
            "`.append('tspan').attr('y', '-0.4em').attr('font-weight', 'bold').text(d => d.data.category)`"
        ));
        assert!(prompt.contains(
            "`.append('tspan').attr('x', 0).attr('y', '0.7em').attr('fill-opacity', 0.7).text(d => d.data.value)`"
        ));
        assert!(prompt.contains("translate(${arcLabel.centroid(d)})"));
        assert!(prompt.contains("The script should parse it before use."));
        assert!(!prompt.contains("csvParse"));
        assert!(!prompt.contains("csvData"));
    }

    #[test]
    fn pie_csv_requires_csv_parse_and_coercion() {
        let prompt = chart_instruction(CSV, Some(ChartType::Pie), DataType::Csv);
        assert!(prompt.contains("**You MUST use `d3.csvParse()` for this.**"));
        assert!(prompt.contains("convert the numeric 'value' column to a number"));
        assert!(prompt.starts_with("Generate a D3.js script to create an advanced Pie Chart"));
    }

    #[test]
    fn unknown_chart_type_leaves_user_turn_empty() {
        let messages = d3_conversation_lenient(JSON, "Scatter Plot", "JSON");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::system(SYSTEM_PROMPT));
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.is_empty());
    }

    #[test]
    fn unknown_data_type_falls_back_to_json() {
        let messages = d3_conversation_lenient(JSON, "Bar Chart", "XML");
        assert!(messages[1].content.contains("const jsonData = `"));
        assert!(messages[1].content.contains("JSON.parse()"));
    }

    #[test]
    fn labels_round_trip_through_parsing() {
        for label in CHART_LABELS {
            assert_eq!(ChartType::from_label(label).map(ChartType::label), Some(*label));
        }
        for label in DATA_LABELS {
            assert!(DataType::from_label(label).is_some());
        }
        assert_eq!(ChartType::from_label("bar chart"), None);
        assert_eq!(DataType::from_label("csv"), None);
    }

    #[test]
    fn raw_data_is_not_escaped() {
        let prompt = chart_instruction("a`b", Some(ChartType::Bar), DataType::Json);
        assert!(prompt.contains("const jsonData = `a`b`;"));
    }
}
