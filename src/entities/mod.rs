//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod announcement;
pub mod assignment;
pub mod audit_log;
pub mod course;
pub mod enrollment;
pub mod password_reset_token;
pub mod payment;
pub mod role;
pub mod session;
pub mod submission;
pub mod user;

// Re-export specific types to avoid conflicts
pub use announcement::{
    Column as AnnouncementColumn, Entity as Announcement, Model as AnnouncementModel,
};
pub use assignment::{Column as AssignmentColumn, Entity as Assignment, Model as AssignmentModel};
pub use audit_log::{Column as AuditLogColumn, Entity as AuditLog, Model as AuditLogModel};
pub use course::{Column as CourseColumn, CourseStatus, Entity as Course, Model as CourseModel};
pub use enrollment::{
    Column as EnrollmentColumn, EnrollmentStatus, Entity as Enrollment, Model as EnrollmentModel,
};
pub use password_reset_token::{
    Column as PasswordResetTokenColumn, Entity as PasswordResetToken,
    Model as PasswordResetTokenModel,
};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel, PaymentStatus};
pub use role::{Column as RoleColumn, Entity as Role, Model as RoleModel};
pub use session::{Column as SessionColumn, Entity as Session, Model as SessionModel};
pub use submission::{Column as SubmissionColumn, Entity as Submission, Model as SubmissionModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
