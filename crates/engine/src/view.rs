use idgraph_core::{ConsolidatedContact, Contact, ContactId, LinkPrecedence};

use crate::error::EngineError;

/// Build the consolidated view of the cluster rooted at `primary_id`.
///
/// `cluster` holds the primary and its secondaries. Emails and phone numbers
/// list the primary's value first, then secondaries in id order, each value
/// once. Secondary ids are ascending.
pub fn consolidate(
    primary_id: ContactId,
    cluster: &[Contact],
) -> Result<ConsolidatedContact, EngineError> {
    let primary = cluster
        .iter()
        .find(|c| c.id == primary_id)
        .ok_or_else(|| {
            EngineError::ConsistencyFault(format!(
                "primary contact {primary_id} missing from its cluster"
            ))
        })?;
    if !primary.is_primary() {
        return Err(EngineError::ConsistencyFault(format!(
            "cluster root {primary_id} is not a primary contact"
        )));
    }

    let mut secondaries: Vec<&Contact> = Vec::new();
    for member in cluster.iter().filter(|c| c.id != primary_id) {
        if member.link_precedence != LinkPrecedence::Secondary
            || member.linked_id != Some(primary_id)
        {
            return Err(EngineError::ConsistencyFault(format!(
                "contact {} is not a secondary of {primary_id}",
                member.id
            )));
        }
        secondaries.push(member);
    }
    secondaries.sort_by_key(|c| c.id);

    let mut emails: Vec<String> = Vec::new();
    let mut phone_numbers: Vec<String> = Vec::new();
    for contact in std::iter::once(primary).chain(secondaries.iter().copied()) {
        push_unique(&mut emails, contact.email.as_deref());
        push_unique(&mut phone_numbers, contact.phone_number.as_deref());
    }

    Ok(ConsolidatedContact {
        primary_contact_id: primary_id,
        emails,
        phone_numbers,
        secondary_contact_ids: secondaries.iter().map(|c| c.id).collect(),
    })
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idgraph_core::Timestamp;

    fn contact(id: i64, email: Option<&str>, phone: Option<&str>, linked: Option<i64>) -> Contact {
        Contact {
            id: ContactId::new(id),
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            link_precedence: if linked.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            linked_id: linked.map(ContactId::new),
            created_at: Timestamp::new(id as u64, 0),
            updated_at: Timestamp::new(id as u64, 0),
            deleted_at: None,
        }
    }

    #[test]
    fn cluster_of_one() {
        let view = consolidate(
            ContactId::new(1),
            &[contact(1, Some("a@x.com"), None, None)],
        )
        .unwrap();
        assert_eq!(view.primary_contact_id, ContactId::new(1));
        assert_eq!(view.emails, vec!["a@x.com"]);
        assert!(view.phone_numbers.is_empty());
        assert!(view.secondary_contact_ids.is_empty());
    }

    #[test]
    fn primary_values_come_first_and_duplicates_collapse() {
        // Secondaries handed over out of order, the primary last.
        let cluster = vec![
            contact(23, Some("mcfly@hillvalley.edu"), Some("123456"), Some(11)),
            contact(12, Some("lorraine@hillvalley.edu"), Some("999"), Some(11)),
            contact(11, Some("george@hillvalley.edu"), Some("919191"), None),
        ];
        let view = consolidate(ContactId::new(11), &cluster).unwrap();
        assert_eq!(
            view.emails,
            vec!["george@hillvalley.edu", "lorraine@hillvalley.edu", "mcfly@hillvalley.edu"]
        );
        assert_eq!(view.phone_numbers, vec!["919191", "999", "123456"]);
        assert_eq!(view.secondary_contact_ids, vec![ContactId::new(12), ContactId::new(23)]);
    }

    #[test]
    fn primary_without_email_does_not_lead_emails() {
        let cluster = vec![
            contact(1, None, Some("111"), None),
            contact(2, Some("b@x.com"), Some("111"), Some(1)),
            contact(3, Some("b@x.com"), Some("222"), Some(1)),
        ];
        let view = consolidate(ContactId::new(1), &cluster).unwrap();
        assert_eq!(view.emails, vec!["b@x.com"]);
        assert_eq!(view.phone_numbers, vec!["111", "222"]);
    }

    #[test]
    fn missing_or_demoted_root_is_a_fault() {
        let cluster = vec![contact(2, Some("b@x.com"), None, Some(1))];
        assert!(matches!(
            consolidate(ContactId::new(1), &cluster),
            Err(EngineError::ConsistencyFault(_))
        ));
        assert!(matches!(
            consolidate(ContactId::new(2), &cluster),
            Err(EngineError::ConsistencyFault(_))
        ));
    }

    #[test]
    fn member_linked_elsewhere_is_a_fault() {
        let cluster = vec![
            contact(1, Some("a@x.com"), None, None),
            contact(5, Some("c@x.com"), None, Some(4)),
        ];
        assert!(matches!(
            consolidate(ContactId::new(1), &cluster),
            Err(EngineError::ConsistencyFault(_))
        ));
    }
}
