use std::collections::HashSet;

use encoding_rs::{UTF_8, WINDOWS_1252};
use thiserror::Error;

use models::{months_remaining, Product};

/// Header row of the downloadable template, in file column order.
pub const TEMPLATE_HEADER: [&str; 13] = [
    "codigo",
    "partida",
    "BODEGA",
    "consumoMensual",
    "codigoidentificacion",
    "tipoProcedimiento",
    "categoria",
    "descripcion",
    "unidad",
    "existencia",
    "codigoClasificacion",
    "numeroProcedimiento",
    "imagePath",
];

const TEMPLATE_EXAMPLE_ROW: [&str; 13] = [
    "INV001",
    "29903",
    "01",
    "15,50",
    "ID-001-00000001",
    "Convenio Marco",
    "Papelería",
    "Papel Bond Tamaño Carta",
    "RESMA",
    "150,00",
    "PAP001",
    "2024LD-000001-0009100001",
    "",
];

pub const TEMPLATE_FILE_NAME: &str = "plantilla_productos.csv";

/// A row must yield at least this many fields to be considered a candidate.
const MIN_FIELDS: usize = 8;

/// Rows containing this marker (case-insensitive) are export footers, not data.
const METADATA_MARKER: &str = "generado por";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(
        "no valid product rows found in the file; check that the 'codigo' and \
         'descripcion' columns are present and filled"
    )]
    NoValidRows,
}

/// Result of parsing one uploaded file: surviving records in first-seen order
/// plus the number of rows dropped because their key repeated within the file.
#[derive(Debug)]
pub struct ImportBatch {
    pub records: Vec<Product>,
    pub duplicates_in_batch: usize,
}

/// Parses product spreadsheets exported as CSV.
///
/// Handles the two encodings seen in the wild (UTF-8 and Windows-1252 from
/// Windows-locale spreadsheet exports), semicolon or comma separators, and
/// the fixed 13-column layout of the warehouse template.
pub struct ProductCsvImporter {
    pub default_unit: String,
    pub default_procedure_type: String,
}

impl ProductCsvImporter {
    pub fn new() -> Self {
        Self {
            default_unit: "UNI".to_string(),
            default_procedure_type: "Convenio Marco".to_string(),
        }
    }

    pub fn with_default_unit(mut self, unit: impl Into<String>) -> Self {
        self.default_unit = unit.into();
        self
    }

    pub fn with_default_procedure_type(mut self, procedure_type: impl Into<String>) -> Self {
        self.default_procedure_type = procedure_type.into();
        self
    }

    /// Parses a whole uploaded file and collapses in-file duplicates.
    ///
    /// Rows sharing a `(code, identificationCode)` pair with an earlier row
    /// of the same file are dropped silently and only counted. Cross-checking
    /// against already persisted products is the caller's job, record by
    /// record, after this returns.
    pub fn import_batch(&self, bytes: &[u8]) -> Result<ImportBatch, ImportError> {
        let text = decode_text(bytes);
        let separator = detect_separator(text.lines().next().unwrap_or(""));

        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();
        let mut duplicates_in_batch = 0usize;

        for candidate in self.candidates(&text, separator) {
            if seen.insert(candidate.composite_key()) {
                records.push(candidate);
            } else {
                duplicates_in_batch += 1;
            }
        }

        if records.is_empty() {
            return Err(ImportError::NoValidRows);
        }

        Ok(ImportBatch {
            records,
            duplicates_in_batch,
        })
    }

    /// Lazy single pass over the data lines (everything after the header).
    fn candidates<'a>(
        &'a self,
        text: &'a str,
        separator: char,
    ) -> impl Iterator<Item = Product> + 'a {
        text.lines()
            .skip(1)
            .filter_map(move |line| self.parse_line(line, separator))
    }

    /// Parses one line into a candidate record, or skips it.
    ///
    /// Skipped: blank lines, separator-only lines, export metadata rows, rows
    /// with fewer than 8 fields, rows without a code, rows without a
    /// description.
    fn parse_line(&self, line: &str, separator: char) -> Option<Product> {
        let line = line.trim();
        if line.is_empty() || line.chars().all(|c| c == separator) {
            return None;
        }
        if line.to_lowercase().contains(METADATA_MARKER) {
            return None;
        }
        let metadata_row_marker = separator.to_string().repeat(3);
        if line.starts_with(&metadata_row_marker) {
            return None;
        }

        let fields: Vec<&str> = line.split(separator).collect();
        if fields.len() < MIN_FIELDS {
            return None;
        }

        let field = |idx: usize| fields.get(idx).map(|f| f.trim()).unwrap_or("");

        let code = field(0);
        if code.is_empty() {
            return None;
        }
        let description = field(7);
        if description.is_empty() {
            return None;
        }

        let monthly_consumption = parse_locale_number(field(3));
        let stock_on_hand = parse_locale_number(field(9));

        let unit = match field(8) {
            "" => self.default_unit.clone(),
            value => value.to_string(),
        };
        let procedure_type = match field(5) {
            "" => self.default_procedure_type.clone(),
            value => value.to_string(),
        };

        Some(Product {
            code: code.to_string(),
            description: description.to_string(),
            budget_line: field(1).to_string(),
            unit,
            warehouse: format!("Bodega {}", field(2)),
            stock_on_hand,
            monthly_consumption,
            months_remaining: months_remaining(stock_on_hand, monthly_consumption),
            classification_code: field(10).to_string(),
            identification_code: field(4).to_string(),
            procedure_number: field(11).to_string(),
            procedure_type,
            image_path: field(12).to_string(),
            category: field(6).to_string(),
            // Not present in the file layout.
            supplier: String::new(),
        })
    }
}

impl Default for ProductCsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes uploaded bytes into text.
///
/// UTF-8 first; if the result contains the replacement character the file was
/// most likely a Windows-locale spreadsheet export, so the same bytes are
/// re-decoded as Windows-1252, which recovers ñ/é/í/ó/ú.
fn decode_text(bytes: &[u8]) -> String {
    // UTF-8 BOM (the template we hand out carries one)
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    let (text, _, _) = UTF_8.decode(bytes);
    if !text.contains('\u{FFFD}') {
        return text.into_owned();
    }

    let (recovered, _, _) = WINDOWS_1252.decode(bytes);
    recovered.into_owned()
}

/// Picks the field separator from the header line, once per file.
fn detect_separator(first_line: &str) -> char {
    if first_line.contains(';') {
        ';'
    } else {
        ','
    }
}

/// Parses a Spanish-locale decimal ("150,00" -> 150.0). Empty or unparseable
/// values coerce to 0. Thousands separators are not handled.
fn parse_locale_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.replacen(',', ".", 1).parse().unwrap_or(0.0)
}

/// Builds the downloadable CSV template: BOM-prefixed, semicolon-separated,
/// header plus one example row.
pub fn template_csv() -> anyhow::Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());
    writer.write_record(TEMPLATE_HEADER)?;
    writer.write_record(TEMPLATE_EXAMPLE_ROW)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("building template: {}", e))?;
    Ok(format!("\u{FEFF}{}", String::from_utf8(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "codigo;partida;BODEGA;consumoMensual;codigoidentificacion;tipoProcedimiento;categoria;descripcion;unidad;existencia;codigoClasificacion;numeroProcedimiento;imagePath";

    fn import(content: &str) -> Result<ImportBatch, ImportError> {
        ProductCsvImporter::new().import_batch(content.as_bytes())
    }

    #[test]
    fn test_parses_reference_line() {
        let file = format!(
            "{}\n02-00548;29903;01;13,00;ID-001;Convenio Marco;Papelería;Papel Bond;RESMA;150,00;PAP001;2024LD-000001;\n",
            HEADER
        );
        let batch = import(&file).unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.duplicates_in_batch, 0);

        let product = &batch.records[0];
        assert_eq!(product.code, "02-00548");
        assert_eq!(product.description, "Papel Bond");
        assert_eq!(product.budget_line, "29903");
        assert_eq!(product.warehouse, "Bodega 01");
        assert_eq!(product.monthly_consumption, 13.0);
        assert_eq!(product.stock_on_hand, 150.0);
        assert_eq!(product.identification_code, "ID-001");
        assert_eq!(product.unit, "RESMA");
        assert_eq!(product.classification_code, "PAP001");
        assert_eq!(product.procedure_number, "2024LD-000001");
        assert_eq!(product.months_remaining, 12); // ceil(150 / 13)
    }

    #[test]
    fn test_defaults_for_blank_unit_and_procedure_type() {
        let file = format!("{}\nA1;;;;ID-9;;;Guantes;;;;;\n", HEADER);
        let batch = import(&file).unwrap();

        let product = &batch.records[0];
        assert_eq!(product.unit, "UNI");
        assert_eq!(product.procedure_type, "Convenio Marco");
        assert_eq!(product.stock_on_hand, 0.0);
        assert_eq!(product.monthly_consumption, 0.0);
        assert_eq!(product.months_remaining, 999);
        assert_eq!(product.supplier, "");
    }

    #[test]
    fn test_windows_1252_bytes_are_recovered() {
        // "Papelería" as Windows-1252 (0xED = í)
        let mut bytes = format!("{}\n", HEADER).into_bytes();
        bytes.extend_from_slice(b"P1;;;;ID-1;;Bodega Papeler\xEDa;Art\xEDculo;;;;;\n");

        let batch = ProductCsvImporter::new().import_batch(&bytes).unwrap();
        assert_eq!(batch.records[0].category, "Bodega Papelería");
        assert_eq!(batch.records[0].description, "Artículo");
        assert!(!batch.records[0].category.contains('\u{FFFD}'));
    }

    #[test]
    fn test_utf8_with_bom_is_accepted() {
        let file = format!("\u{FEFF}{}\nP1;;;;ID-1;;;Añil;;;;;\n", HEADER);
        let batch = import(&file).unwrap();
        assert_eq!(batch.records[0].description, "Añil");
    }

    #[test]
    fn test_comma_separator_is_detected() {
        let file = "codigo,partida,BODEGA,consumoMensual,codigoidentificacion,tipoProcedimiento,categoria,descripcion,unidad,existencia\nP1,29903,01,2,ID-1,,,Cinta adhesiva,UNI,8\n";
        let batch = import(file).unwrap();

        let product = &batch.records[0];
        assert_eq!(product.code, "P1");
        assert_eq!(product.description, "Cinta adhesiva");
        assert_eq!(product.stock_on_hand, 8.0);
        assert_eq!(product.months_remaining, 4);
    }

    #[test]
    fn test_semicolon_header_wins_over_embedded_commas() {
        let file = format!(
            "{}\nP1;29903;01;1,00;ID-1;;;Papel, tamaño carta;UNI;3,00;;;\n",
            HEADER
        );
        let batch = import(&file).unwrap();
        // The free-text comma stays inside the description field.
        assert_eq!(batch.records[0].description, "Papel, tamaño carta");
    }

    #[test]
    fn test_skips_short_metadata_and_blank_lines() {
        let file = format!(
            "{}\n\n;;;;;;;;;;;;\n;;;Reporte mensual\nGenerado por el usuario: admin\nP1;1;01;1;ID-1;;;Tinta;UNI;5;;;\nsolo;cinco;campos;en;linea\n",
            HEADER
        );
        let batch = import(&file).unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].code, "P1");
        // Skipped lines are not duplicates, just noise.
        assert_eq!(batch.duplicates_in_batch, 0);
    }

    #[test]
    fn test_discards_rows_without_description() {
        let file = format!("{}\nP1;1;01;1;ID-1;;;;UNI;5;;;\n", HEADER);
        assert!(matches!(import(&file), Err(ImportError::NoValidRows)));
    }

    #[test]
    fn test_in_batch_duplicates_collapse_to_first_seen() {
        let file = format!(
            "{}\nP1;1;01;1;ID-1;;;Tinta negra;UNI;5;;;\n  P1 ;1;01;1; ID-1 ;;;Tinta negra bis;UNI;9;;;\nP1;1;01;1;ID-2;;;Tinta azul;UNI;5;;;\n",
            HEADER
        );
        let batch = import(&file).unwrap();

        // Same (code, identificationCode) after trimming: one survivor.
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.duplicates_in_batch, 1);
        assert_eq!(batch.records[0].description, "Tinta negra");
        assert_eq!(batch.records[1].identification_code, "ID-2");
    }

    #[test]
    fn test_empty_file_is_no_valid_rows() {
        assert!(matches!(import(""), Err(ImportError::NoValidRows)));
        assert!(matches!(
            import(&format!("{}\n", HEADER)),
            Err(ImportError::NoValidRows)
        ));
    }

    #[test]
    fn test_locale_numbers() {
        assert_eq!(parse_locale_number("13,00"), 13.0);
        assert_eq!(parse_locale_number(" 150,50 "), 150.5);
        assert_eq!(parse_locale_number("8"), 8.0);
        assert_eq!(parse_locale_number(""), 0.0);
        assert_eq!(parse_locale_number("n/a"), 0.0);
        // Thousands separators are not stripped; the value coerces to 0.
        assert_eq!(parse_locale_number("1.234,56"), 0.0);
    }

    #[test]
    fn test_template_round_trips_through_importer() {
        let template = template_csv().unwrap();
        assert!(template.starts_with('\u{FEFF}'));
        assert!(template.contains("codigo;partida;BODEGA"));

        let batch = import(&template).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].code, "INV001");
        assert_eq!(batch.records[0].monthly_consumption, 15.5);
        assert_eq!(batch.records[0].months_remaining, 10); // ceil(150 / 15.5)
    }
}
