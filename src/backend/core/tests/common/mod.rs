//! Shared fixtures: an in-memory school with seeded roles and an admin.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use school_core::config::{AuthConfig, SchoolConfig};
use school_core::identity::{CoarseRole, LocalCredentials, RegistrationRequest};
use school_core::rbac::{catalog, Principal};
use school_core::school::{
    Assignment, AssignmentStatus, AssignmentUpdate, Class, NewAssignment, NewClass, NewStudentProfile,
    NewSubject, NewTeacherProfile, StudentProfile, Subject, TeacherProfile,
};
use school_core::service::SchoolService;
use school_core::store::MemoryStore;

pub const PASSWORD: &str = "Tr1cky-Walrus";

/// A registered account with its current bearer token.
#[derive(Debug, Clone)]
pub struct Member {
    pub token: String,
    pub principal: Principal,
}

pub struct School {
    pub service: SchoolService,
    pub admin: Member,
}

pub async fn service() -> SchoolService {
    service_with(SchoolConfig::default()).await
}

pub async fn service_with(config: SchoolConfig) -> SchoolService {
    let store = Arc::new(MemoryStore::new());
    catalog::seed_defaults(store.as_ref()).await.unwrap();
    let credentials = LocalCredentials::new(&AuthConfig::new("integration-secret")).unwrap();
    SchoolService::new(store, Arc::new(credentials), config)
}

pub async fn school() -> School {
    let service = service().await;
    let admin = register(&service, "principal", CoarseRole::Admin).await;
    School { service, admin }
}

pub async fn register(service: &SchoolService, username: &str, role: CoarseRole) -> Member {
    let request = RegistrationRequest::new(username, format!("{}@school.test", username), PASSWORD)
        .with_role(role);
    let response = service.register(request).await.unwrap();
    let principal = service.authenticate(&response.token).await.unwrap();
    Member {
        token: response.token,
        principal,
    }
}

/// Re-resolve the principal, picking up profiles and role links made since.
pub async fn refresh(service: &SchoolService, member: &Member) -> Member {
    Member {
        token: member.token.clone(),
        principal: service.authenticate(&member.token).await.unwrap(),
    }
}

impl School {
    pub async fn student(&self, username: &str, number: &str) -> (Member, StudentProfile) {
        let member = register(&self.service, username, CoarseRole::Student).await;
        let profile = self
            .service
            .create_student_profile(
                &self.admin.principal,
                NewStudentProfile {
                    account_id: member.principal.account_id.unwrap(),
                    student_number: number.to_string(),
                    grade_level: 9,
                    enrollment_date: None,
                    guardian_name: None,
                    guardian_phone: None,
                },
            )
            .await
            .unwrap();
        (refresh(&self.service, &member).await, profile)
    }

    pub async fn teacher(&self, username: &str, number: &str) -> (Member, TeacherProfile) {
        let member = register(&self.service, username, CoarseRole::Teacher).await;
        let profile = self
            .service
            .create_teacher_profile(
                &self.admin.principal,
                NewTeacherProfile {
                    account_id: member.principal.account_id.unwrap(),
                    employee_number: number.to_string(),
                    department: "Sciences".to_string(),
                    qualification: None,
                    hire_date: None,
                    subjects: Vec::new(),
                },
            )
            .await
            .unwrap();
        (refresh(&self.service, &member).await, profile)
    }

    pub async fn subject(&self, code: &str) -> Subject {
        self.service
            .create_subject(
                &self.admin.principal,
                NewSubject {
                    code: code.to_string(),
                    name: format!("Subject {}", code),
                    description: String::new(),
                    credits: 3,
                },
            )
            .await
            .unwrap()
    }

    pub async fn class(&self, subject: &Subject, teacher: &TeacherProfile, capacity: u32) -> Class {
        self.service
            .create_class(
                &self.admin.principal,
                NewClass {
                    name: format!("{} section A", subject.code),
                    subject_id: subject.id,
                    teacher_id: teacher.id,
                    room_number: Some("B12".to_string()),
                    max_capacity: Some(capacity),
                },
            )
            .await
            .unwrap()
    }

    /// A published assignment due `due_in` from now.
    pub async fn published_assignment(&self, class: &Class, due_in: Duration) -> Assignment {
        let assignment = self
            .service
            .create_assignment(
                &self.admin.principal,
                NewAssignment {
                    class_id: class.id,
                    title: "Lab report".to_string(),
                    description: String::new(),
                    due_date: Utc::now() + due_in,
                    max_points: None,
                },
            )
            .await
            .unwrap();
        self.service
            .update_assignment(
                &self.admin.principal,
                assignment.id,
                AssignmentUpdate {
                    status: Some(AssignmentStatus::Published),
                    due_date: None,
                },
            )
            .await
            .unwrap()
    }
}
