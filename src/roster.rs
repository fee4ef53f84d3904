//! Read-only reference tables: enrolled students, administrators, courses and labs.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::AppResult;
use crate::model::{AdminAccount, Lab, Student, normalize_email, same_key, title_case};
use crate::schema::{cell, decode_table, tables};
use crate::store::{RecordStore, RetryPolicy};

/// Enrolled students keyed by normalized email.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    students: BTreeMap<String, Student>,
}

impl Roster {
    pub fn new(students: Vec<Student>) -> Self {
        let mut map = BTreeMap::new();
        for mut student in students {
            student.email = normalize_email(&student.email);
            // first listing of an email wins
            map.entry(student.email.clone()).or_insert(student);
        }
        Roster { students: map }
    }

    pub fn load(store: &dyn RecordStore, retry: &RetryPolicy) -> AppResult<Self> {
        let rows = retry.read_all(store, tables::STUDENTS)?;
        Ok(Roster::new(decode_table(&rows)?))
    }

    pub fn get(&self, email: &str) -> Option<&Student> {
        self.students.get(&normalize_email(email))
    }

    pub fn contains(&self, email: &str) -> bool {
        self.get(email).is_some()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    /// Distinct faculties, title-cased and sorted.
    pub fn faculties(&self) -> Vec<String> {
        self.iter()
            .map(|s| title_case(&s.faculty))
            .filter(|f| !f.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct programs offered in `faculty`, title-cased and sorted.
    pub fn programs(&self, faculty: &str) -> Vec<String> {
        self.iter()
            .filter(|s| same_key(&s.faculty, faculty))
            .map(|s| title_case(&s.program))
            .filter(|p| !p.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Students matching the optional faculty and program filters.
    pub fn students_in<'a>(
        &'a self,
        faculty: Option<&'a str>,
        program: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Student> + 'a {
        self.iter().filter(move |s| {
            faculty.is_none_or(|f| same_key(&s.faculty, f))
                && program.is_none_or(|p| same_key(&s.program, p))
        })
    }
}

/// Administrator logins.
pub fn load_admins(store: &dyn RecordStore, retry: &RetryPolicy) -> AppResult<Vec<AdminAccount>> {
    let rows = retry.read_all(store, tables::ADMINS)?;
    Ok(decode_table(&rows)?)
}

/// Course identifiers from the first column of the course list, sorted and de-duplicated.
pub fn load_courses(store: &dyn RecordStore, retry: &RetryPolicy) -> AppResult<Vec<String>> {
    let rows = retry.read_all(store, tables::COURSES)?;
    Ok(rows
        .iter()
        .skip(1)
        .map(|row| cell(row, 0).to_string())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}

pub fn load_labs(store: &dyn RecordStore, retry: &RetryPolicy) -> AppResult<Vec<Lab>> {
    let rows = retry.read_all(store, tables::LABS)?;
    Ok(decode_table(&rows)?)
}

/// Lab names offered for `course`, sorted and de-duplicated.
pub fn labs_for(labs: &[Lab], course: &str) -> Vec<String> {
    labs.iter()
        .filter(|lab| same_key(&lab.course, course))
        .map(|lab| lab.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn student(email: &str, faculty: &str, program: &str) -> Student {
        Student {
            email: email.into(),
            student_id: "1".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            faculty: faculty.into(),
            program: program.into(),
        }
    }

    #[test]
    fn lookups_are_normalized() {
        let roster = Roster::new(vec![student(" Ada@Uni.edu", "computing", "cs")]);
        assert!(roster.contains("ada@uni.edu"));
        assert!(roster.contains("  ADA@uni.edu "));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn faculty_and_program_options_are_title_cased() {
        let roster = Roster::new(vec![
            student("a@x.edu", "computing", "computer science"),
            student("b@x.edu", "Computing", "Data Science"),
            student("c@x.edu", "arts", "history"),
        ]);
        assert_eq!(roster.faculties(), vec!["Arts", "Computing"]);
        assert_eq!(
            roster.programs("COMPUTING"),
            vec!["Computer Science", "Data Science"]
        );
        assert_eq!(roster.students_in(Some("arts"), None).count(), 1);
        assert_eq!(roster.students_in(None, None).count(), 3);
    }

    #[test]
    fn courses_skip_header_and_duplicates() {
        let store = MemoryStore::new();
        for c in ["course", "CSC 102", "CSC 101", "", "CSC 101"] {
            store.append(tables::COURSES, vec![c.to_string()]).unwrap();
        }
        let courses = load_courses(&store, &RetryPolicy::immediate(1)).unwrap();
        assert_eq!(courses, vec!["CSC 101", "CSC 102"]);
    }

    #[test]
    fn labs_are_filtered_by_course() {
        let labs = vec![
            Lab {
                course: "CSC 101".into(),
                name: "Lab 2".into(),
            },
            Lab {
                course: "csc 101".into(),
                name: "Lab 1".into(),
            },
            Lab {
                course: "CSC 102".into(),
                name: "Lab 9".into(),
            },
        ];
        assert_eq!(labs_for(&labs, "CSC 101"), vec!["Lab 1", "Lab 2"]);
    }
}
