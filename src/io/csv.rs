//! Single-writer CSV serialization of gathered surface data.
//!
//! Layout:
//! ```text
//! "Point","<field1>",...,"<fieldN>"
//! <global_id>, <v1>, ..., <vN>
//! ```
//! Values use C-style `%.{p}e` scientific notation so files re-parse to the
//! written precision. Rows come out rank by rank, each rank's points in the
//! order that rank sent them.

use crate::algs::gather::GatheredField;
use crate::algs::wire::WireScalar;
use crate::data::field_catalog::FieldCatalog;
use itertools::Itertools;
use std::fmt::{self, Write as _};
use std::io::{self, Write};

/// Digits after the decimal point in the mantissa.
pub const DEFAULT_PRECISION: usize = 15;

/// Header name of the leading id column.
pub const ID_COLUMN: &str = "Point";

const VALUE_SEPARATOR: &str = ", ";

/// Append `v` as `d.ddd…e±XX` with `precision` fractional digits.
///
/// Matches C's `%.{precision}e`: the exponent always carries a sign and at
/// least two digits; non-finite values print as `nan`, `inf` or `-inf`.
pub fn write_scientific<W: fmt::Write>(out: &mut W, v: f64, precision: usize) -> fmt::Result {
    if v.is_nan() {
        return out.write_str("nan");
    }
    if v.is_infinite() {
        return out.write_str(if v < 0.0 { "-inf" } else { "inf" });
    }
    let raw = format!("{v:.precision$e}");
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    write!(out, "{mantissa}e{sign}{:02}", exp.unsigned_abs())
}

/// `v` formatted by [`write_scientific`].
pub fn format_scientific(v: f64, precision: usize) -> String {
    let mut s = String::with_capacity(precision + 8);
    // writing into a String cannot fail
    let _ = write_scientific(&mut s, v, precision);
    s
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Header line (without newline): the id column then every catalog name, quoted.
pub fn header_line(catalog: &FieldCatalog) -> String {
    std::iter::once(ID_COLUMN)
        .chain(catalog.names())
        .map(quote)
        .join(",")
}

/// Writes surface CSV text; holds only formatting settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsvSurfaceWriter {
    precision: usize,
}

impl Default for CsvSurfaceWriter {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl CsvSurfaceWriter {
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn write_header<W: Write>(&self, out: &mut W, catalog: &FieldCatalog) -> io::Result<()> {
        writeln!(out, "{}", header_line(catalog))
    }

    /// One data line for `id`; `line` is scratch space reused across rows.
    fn write_row<W: Write>(
        &self,
        out: &mut W,
        line: &mut String,
        id: u64,
        values: &[WireScalar],
    ) -> io::Result<()> {
        line.clear();
        let _ = write!(line, "{id}");
        for v in values {
            line.push_str(VALUE_SEPARATOR);
            let _ = write_scientific(line, v.get(), self.precision);
        }
        line.push('\n');
        out.write_all(line.as_bytes())
    }

    /// Header plus one line per real point of `field`; returns the data line count.
    ///
    /// Padding rows are never visited. Output depends only on `catalog` and
    /// `field`, so repeated calls produce identical bytes.
    pub fn write_gathered<W: Write>(
        &self,
        out: &mut W,
        catalog: &FieldCatalog,
        field: &GatheredField,
    ) -> io::Result<usize> {
        if catalog.len() != field.width() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "catalog has {} fields but gathered rows carry {}",
                    catalog.len(),
                    field.width()
                ),
            ));
        }
        self.write_header(out, catalog)?;
        let mut line = String::new();
        let mut rows = 0;
        for (id, values) in field.rows() {
            self.write_row(out, &mut line, id, values)?;
            rows += 1;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::wire::WireId;

    #[test]
    fn scientific_matches_c_format() {
        assert_eq!(format_scientific(1.5, 15), "1.500000000000000e+00");
        assert_eq!(format_scientific(9.0, 15), "9.000000000000000e+00");
        assert_eq!(format_scientific(-2.5e-20, 3), "-2.500e-20");
        assert_eq!(format_scientific(1e-20, 15), "1.000000000000000e-20");
        assert_eq!(format_scientific(6.02e123, 2), "6.02e+123");
        assert_eq!(format_scientific(0.0, 2), "0.00e+00");
        assert_eq!(format_scientific(2.0, 0), "2e+00");
        assert_eq!(format_scientific(-31.0, 0), "-3e+01");
    }

    #[test]
    fn non_finite_values() {
        assert_eq!(format_scientific(f64::NAN, 15), "nan");
        assert_eq!(format_scientific(f64::INFINITY, 15), "inf");
        assert_eq!(format_scientific(f64::NEG_INFINITY, 15), "-inf");
    }

    #[test]
    fn header_quotes_every_name() {
        let one = FieldCatalog::new(["P"]).unwrap();
        assert_eq!(header_line(&one), r#""Point","P""#);
        let odd = FieldCatalog::new(["x", "say \"hi\""]).unwrap();
        assert_eq!(header_line(&odd), r#""Point","x","say ""hi""""#);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let catalog = FieldCatalog::new(["a", "b"]).unwrap();
        let field = GatheredField::from_padded(
            vec![WireId::of(1)],
            vec![WireScalar::of(1.0)],
            vec![1],
            1,
            1,
        );
        let err = CsvSurfaceWriter::default()
            .write_gathered(&mut Vec::new(), &catalog, &field)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rows_are_comma_space_separated() {
        let catalog = FieldCatalog::new(["a", "b"]).unwrap();
        let field = GatheredField::from_padded(
            vec![WireId::of(42), WireId::of(0)],
            [1.0, -2.0, 0.0, 0.0].map(WireScalar::of).to_vec(),
            vec![1],
            2,
            2,
        );
        let mut out = Vec::new();
        let rows = CsvSurfaceWriter::new(2)
            .write_gathered(&mut out, &catalog, &field)
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\"Point\",\"a\",\"b\"\n42, 1.00e+00, -2.00e+00\n"
        );
    }
}
