use crate::entities::letter::Letter;

/// Narrows a loaded letter list the way the registry table does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LetterFilter {
    /// Case-insensitive substring searched in numbers, subject and counterparties.
    pub query: Option<String>,
    /// Exact match on the outgoing executor or the incoming registrar.
    pub executor: Option<String>,
}

impl LetterFilter {
    pub fn matches(&self, letter: &Letter) -> bool {
        if let Some(executor) = self.executor.as_deref().filter(|e| !e.is_empty()) {
            let responsible = match letter {
                Letter::Outgoing(letter) => &letter.executor,
                Letter::Incoming(letter) => &letter.registered_by,
            };
            if responsible != executor {
                return false;
            }
        }

        let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
            return true;
        };
        let query = query.to_lowercase();
        searchable(letter)
            .iter()
            .any(|text| text.to_lowercase().contains(&query))
    }

    pub fn apply<'a>(&self, letters: &'a [Letter]) -> Vec<&'a Letter> {
        letters.iter().filter(|letter| self.matches(letter)).collect()
    }
}

fn searchable(letter: &Letter) -> Vec<&str> {
    match letter {
        Letter::Outgoing(letter) => vec![
            letter.outgoing_number.as_str(),
            letter.subject.as_str(),
            letter.recipient.as_str(),
        ],
        Letter::Incoming(letter) => {
            let mut fields = vec![
                letter.internal_number.as_str(),
                letter.subject.as_str(),
                letter.sender.as_str(),
                letter.addressee.as_str(),
            ];
            if let Some(external) = &letter.external_number {
                fields.push(external.as_str());
            }
            fields
        }
    }
}
