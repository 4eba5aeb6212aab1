//! HTMLテーブルからラベル/値の行を取り出す

use scraper::{ElementRef, Html, Selector};

/// 結果テーブルとして優先順に試すセレクタ
pub const RESULT_TABLE_SELECTORS: &[&str] = &["table.fipeTablePriceDetail", "table.table", "table"];

/// 結果テーブル（最初に一致したもの）の行
pub fn result_table_rows(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    for selector in RESULT_TABLE_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        if let Some(table) = document.select(&sel).next() {
            return row_pairs(table);
        }
    }
    Vec::new()
}

/// 文書内の全テーブルの行
pub fn all_table_rows(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse("table") else {
        return Vec::new();
    };
    document.select(&sel).flat_map(row_pairs).collect()
}

/// セルが2つ以上ある行の先頭2セルを (ラベル, 値) として返す
fn row_pairs(table: ElementRef<'_>) -> Vec<(String, String)> {
    let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("td, th")) else {
        return Vec::new();
    };
    table
        .select(&row_sel)
        .filter_map(|row| {
            let mut cells = row.select(&cell_sel);
            let label = cell_text(cells.next()?);
            let value = cell_text(cells.next()?);
            Some((label, value))
        })
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 行リストを `VehicleFields::from_rows` に渡せる形で借用する
pub fn borrowed(rows: &[(String, String)]) -> impl Iterator<Item = (&str, &str)> {
    rows.iter().map(|(l, v)| (l.as_str(), v.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <table class="other"><tr><td>Placa</td><td>ABC1234</td></tr></table>
          <table class="fipeTablePriceDetail">
            <tr><td>Marca:</td><td> VW </td></tr>
            <tr><td>Modelo:</td><td>GOL <b>1.0</b></td></tr>
            <tr><td colspan="2">separador</td></tr>
          </table>
        </body></html>"#;

    #[test]
    fn test_prefers_result_table_class() {
        let rows = result_table_rows(PAGE);
        assert_eq!(
            rows,
            vec![
                ("Marca:".to_string(), "VW".to_string()),
                ("Modelo:".to_string(), "GOL 1.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_falls_back_to_first_table() {
        let rows = result_table_rows("<table><tr><th>Cor</th><td>Prata</td></tr></table>");
        assert_eq!(rows, vec![("Cor".to_string(), "Prata".to_string())]);
    }

    #[test]
    fn test_all_tables_and_no_table() {
        assert_eq!(all_table_rows(PAGE).len(), 3);
        assert!(result_table_rows("<p>nada</p>").is_empty());
    }
}
