//! Pipe-delimited record files for bulk load.
//!
//! The first line of every file is a header. Vertex files lead with one id
//! column, edge files with two (source, destination). The remaining columns
//! are matched to declared properties by header name, falling back to
//! position when the header does not name them.

use crate::error::{GraphError, Result};
use crate::property::Any;
use crate::types::{Oid, PropertyType, Timestamp};
use smallvec::SmallVec;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const DELIMITER: char = '|';

/// Fields of one line; most records have only a handful of columns.
type Fields<'a> = SmallVec<[&'a str; 16]>;

#[derive(Debug, Clone, PartialEq)]
pub struct VertexRecord {
    pub oid: Oid,
    pub values: SmallVec<[Any<'static>; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub src: Oid,
    pub dst: Oid,
    pub data: Any<'static>,
    pub ts: Timestamp,
}

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> GraphError {
    GraphError::Parse { path: path.to_path_buf(), line, message: message.into() }
}

fn split(line: &str) -> Fields<'_> {
    line.trim_end_matches(['\r', '\n']).split(DELIMITER).collect()
}

/// Column index in the record for each declared property.
fn resolve_columns(path: &Path, header: &Fields<'_>, id_cols: usize, names: &[String]) -> Result<Vec<usize>> {
    let rest = header.get(id_cols..).unwrap_or(&[]);
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rest.iter()
                .position(|h| h.trim() == name.as_str())
                .or_else(|| (rest.len() == names.len()).then_some(i))
                .map(|pos| pos + id_cols)
                .ok_or_else(|| parse_error(path, 1, format!("header has no column for property `{}`", name)))
        })
        .collect()
}

fn parse_oid(path: &Path, line: usize, field: Option<&&str>) -> Result<Oid> {
    let field = field.ok_or_else(|| parse_error(path, line, "missing id field"))?;
    field.trim().parse().map_err(|_| parse_error(path, line, format!("invalid id `{}`", field)))
}

fn parse_value(path: &Path, line: usize, ty: PropertyType, field: Option<&&str>) -> Result<Any<'static>> {
    let field = field.ok_or_else(|| parse_error(path, line, "record is shorter than its header"))?;
    Any::parse(ty, field)
        .map(Any::into_owned)
        .map_err(|e| parse_error(path, line, e.to_string()))
}

/// Visit every non-empty data line with its 1-based line number.
fn for_each_record(path: &Path, mut visit: impl FnMut(usize, &Fields<'_>, &Fields<'_>) -> Result<()>) -> Result<()> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    let header_line = match lines.next() {
        Some(line) => line?,
        None => return Ok(()),
    };
    let header = split(&header_line);
    for (i, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        visit(i + 2, &header, &split(&line))?;
    }
    Ok(())
}

pub fn read_vertex_file(path: &Path, names: &[String], types: &[PropertyType]) -> Result<Vec<VertexRecord>> {
    let mut records = Vec::new();
    let mut columns: Option<Vec<usize>> = None;
    for_each_record(path, |line, header, fields| {
        if columns.is_none() {
            columns = Some(resolve_columns(path, header, 1, names)?);
        }
        let cols = columns.as_deref().unwrap_or(&[]);
        let oid = parse_oid(path, line, fields.first())?;
        let values = cols
            .iter()
            .zip(types)
            .map(|(&col, &ty)| parse_value(path, line, ty, fields.get(col)))
            .collect::<Result<_>>()?;
        records.push(VertexRecord { oid, values });
        Ok(())
    })?;
    Ok(records)
}

/// `property` names the edge payload column, if the edge carries one.
pub fn read_edge_file(path: &Path, property: Option<(&str, PropertyType)>) -> Result<Vec<EdgeRecord>> {
    let mut records = Vec::new();
    let mut column: Option<Option<usize>> = None;
    for_each_record(path, |line, header, fields| {
        if column.is_none() {
            column = Some(match property {
                Some((name, _)) => Some(resolve_columns(path, header, 2, &[name.to_string()])?[0]),
                None => None,
            });
        }
        let src = parse_oid(path, line, fields.first())?;
        let dst = parse_oid(path, line, fields.get(1))?;
        let data = match (property, column.flatten()) {
            (Some((_, ty)), Some(col)) => parse_value(path, line, ty, fields.get(col))?,
            _ => Any::Empty,
        };
        records.push(EdgeRecord { src, dst, data, ts: 0 });
        Ok(())
    })?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Date;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_vertex_file_by_header_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("person.csv");
        std::fs::write(
            &path,
            "id|creationDate|firstName|locationIP\n\
             933|2010-02-14T15:32:10.447+0000|Mahinda|119.235.7.103\r\n\
             \n\
             1129|2010-01-02|Carmen|196.1.0.1\n",
        )
        .unwrap();
        let records = read_vertex_file(
            &path,
            &names(&["firstName", "creationDate", "locationIP"]),
            &[PropertyType::String, PropertyType::Date, PropertyType::IpAddr],
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].oid, 933);
        assert_eq!(records[0].values[0], Any::from("Mahinda"));
        assert_eq!(records[0].values[1], Any::Date(Date::from_millis(1_266_161_530_447)));
        assert_eq!(records[1].values[2], Any::IpAddr(Ipv4Addr::new(196, 1, 0, 1)));
    }

    #[test]
    fn test_positional_fallback_and_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.csv");
        std::fs::write(&path, "oid|a|b\n1|5|x\n2|bad|y\n").unwrap();
        let err = read_vertex_file(&path, &names(&["n", "s"]), &[PropertyType::Int32, PropertyType::String]).unwrap_err();
        assert!(matches!(err, GraphError::Parse { line: 3, .. }));

        std::fs::write(&path, "oid|a\n1|5\n").unwrap();
        let err = read_vertex_file(&path, &names(&["n", "s"]), &[PropertyType::Int32, PropertyType::String]).unwrap_err();
        assert!(matches!(err, GraphError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_edge_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("knows.csv");
        std::fs::write(&path, "Person.id|Person.id|creationDate\n1|2|1262304000000\n1|3|2010-01-01\n").unwrap();
        let records = read_edge_file(&path, Some(("creationDate", PropertyType::Date))).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!((records[1].src, records[1].dst), (1, 3));
        assert_eq!(records[0].data, records[1].data);

        let bare = read_edge_file(&path, None).unwrap();
        assert_eq!(bare[0].data, Any::Empty);
        assert_eq!(bare[0].ts, 0);
    }
}
