use common::entities::letter::{Letter, DATE_FORMAT};
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet, XlsxError};

pub const EXPORT_FILE_NAME: &str = "Mail_registry.xlsx";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const OUTGOING_SHEET: &str = "Исходящие";
const INCOMING_SHEET: &str = "Входящие";

const OUTGOING_COLUMNS: [(&str, f64); 5] = [
    ("Исходящий номер", 18.0),
    ("Дата регистрации", 17.0),
    ("Адресат", 25.0),
    ("Краткое содержание", 87.0),
    ("Исполнитель", 17.0),
];

const INCOMING_COLUMNS: [(&str, f64); 7] = [
    ("Входящий номер", 11.0),
    ("Номер и дата письма", 25.0),
    ("Дата регистрации", 27.0),
    ("Отправитель", 21.0),
    ("Адресат", 25.0),
    ("Краткое содержание", 75.0),
    ("Зарегистрировал", 21.0),
];

fn header(sheet: &mut Worksheet, columns: &[(&str, f64)]) -> Result<(), XlsxError> {
    let bold = Format::new()
        .set_bold()
        .set_text_wrap()
        .set_font_size(10)
        .set_align(FormatAlign::Center);
    for (col, (title, width)) in columns.iter().enumerate() {
        let col = col as u16;
        sheet.set_column_width(col, *width)?;
        sheet.write_string_with_format(0, col, *title, &bold)?;
    }
    Ok(())
}

fn row(sheet: &mut Worksheet, row: u32, values: &[&str]) -> Result<(), XlsxError> {
    for (col, value) in values.iter().enumerate() {
        sheet.write_string(row, col as u16, *value)?;
    }
    Ok(())
}

/// Builds the registry workbook: one sheet per kind, rows in the given order.
pub fn workbook(letters: &[Letter]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(OUTGOING_SHEET)?;
    header(sheet, &OUTGOING_COLUMNS)?;
    let outgoing = letters.iter().filter_map(|letter| match letter {
        Letter::Outgoing(letter) => Some(letter),
        Letter::Incoming(_) => None,
    });
    for (index, letter) in outgoing.enumerate() {
        let date = letter.registration_date.format(DATE_FORMAT).to_string();
        row(
            sheet,
            index as u32 + 1,
            &[
                letter.outgoing_number.as_str(),
                date.as_str(),
                letter.recipient.as_str(),
                letter.subject.as_str(),
                letter.executor.as_str(),
            ],
        )?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name(INCOMING_SHEET)?;
    header(sheet, &INCOMING_COLUMNS)?;
    let incoming = letters.iter().filter_map(|letter| match letter {
        Letter::Incoming(letter) => Some(letter),
        Letter::Outgoing(_) => None,
    });
    for (index, letter) in incoming.enumerate() {
        let date = letter.registration_date.format(DATE_FORMAT).to_string();
        row(
            sheet,
            index as u32 + 1,
            &[
                letter.internal_number.as_str(),
                letter.external_number.as_deref().unwrap_or_default(),
                date.as_str(),
                letter.sender.as_str(),
                letter.addressee.as_str(),
                letter.subject.as_str(),
                letter.registered_by.as_str(),
            ],
        )?;
    }

    workbook.save_to_buffer()
}
