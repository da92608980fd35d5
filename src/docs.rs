use crate::api::attendance::{CheckInBody, CheckOutBody, CheckOutResponse};
use crate::api::customer::CreateCustomer;
use crate::api::invoice::{CreateInvoice, InvoiceListResponse, InvoiceStatusBody};
use crate::api::leave_request::{
    CreateLeave, DecisionBody, EscalateBody, LeaveFilter, LeaveListResponse, LeaveResponse,
};
use crate::api::policy::UpsertPolicy;
use crate::api::product::CreateProduct;
use crate::api::quotation::{
    ConvertBody, CreateQuotation, QuotationListResponse, QuotationStatusBody,
};
use crate::api::user::{CreateUser, UserListResponse};
use crate::auth::handlers::{ChangePassword, LoginResponse, UpdateProfile};
use crate::model::attendance::{Attendance, AttendanceStatus, WorkLocation};
use crate::model::customer::Customer;
use crate::model::department_policy::DepartmentPolicy;
use crate::model::invoice::{Invoice, InvoiceStatus};
use crate::model::leave_request::{EscalationTarget, LeaveStatus, LeaveType};
use crate::model::product::Product;
use crate::model::quotation::{Quotation, QuotationStatus};
use crate::model::role::Role;
use crate::model::user::User;
use crate::models::{LoginReqDto, PasswordResetConfirm, PasswordResetReq};
use crate::service::attendance_rules::AttendanceSummary;
use crate::service::billing::{LineItem, Totals};
use crate::service::leave_rules::LeaveBalance;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "OpsDesk API",
        version = "1.0.0",
        description = r#"
## OpsDesk business operations console

Back office API for a small company: leave approvals, attendance with
department policies, and customer billing.

### Key Features
- **Leave**
  - Casual, permission, sick and vacation requests checked against monthly allowances
  - Approve, reject or escalate (TL / HR / GM / MD); each request is decided once
- **Attendance**
  - Check-in with late detection, check-out with overtime detection and an office geofence
  - Monthly records and summaries
- **Policies**
  - Per-department working hours, off-site and overtime rules, monthly allowances
- **Billing**
  - Customers, products, quotations with 18% tax, conversion to invoices

### Security
Endpoints under `/api` require a **JWT Bearer** access token from `/auth/login`.
Approver and management operations require the **admin** or **master_admin** role.

### Response Format
- JSON bodies; errors are `{"message": "..."}`
- Pagination (`page`, `per_page`) on list endpoints
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::request_password_reset,
        crate::auth::handlers::confirm_password_reset,
        crate::auth::handlers::me,
        crate::auth::handlers::update_me,
        crate::auth::handlers::change_password,

        crate::api::user::create_user,
        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::update_user,

        crate::api::policy::list_policies,
        crate::api::policy::get_policy,
        crate::api::policy::upsert_policy,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::leave_balance,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::escalate_leave,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::list_attendance,
        crate::api::attendance::attendance_summary,

        crate::api::customer::create_customer,
        crate::api::customer::list_customers,
        crate::api::customer::get_customer,
        crate::api::customer::update_customer,
        crate::api::customer::delete_customer,

        crate::api::product::create_product,
        crate::api::product::list_products,
        crate::api::product::get_product,
        crate::api::product::update_product,
        crate::api::product::delete_product,

        crate::api::quotation::create_quotation,
        crate::api::quotation::list_quotations,
        crate::api::quotation::get_quotation,
        crate::api::quotation::update_quotation_status,
        crate::api::quotation::convert_quotation,

        crate::api::invoice::create_invoice,
        crate::api::invoice::list_invoices,
        crate::api::invoice::get_invoice,
        crate::api::invoice::update_invoice_status
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            PasswordResetReq,
            PasswordResetConfirm,
            UpdateProfile,
            ChangePassword,
            Role,
            User,
            CreateUser,
            UserListResponse,
            DepartmentPolicy,
            UpsertPolicy,
            LeaveType,
            LeaveStatus,
            EscalationTarget,
            CreateLeave,
            DecisionBody,
            EscalateBody,
            LeaveFilter,
            LeaveResponse,
            LeaveListResponse,
            LeaveBalance,
            WorkLocation,
            AttendanceStatus,
            Attendance,
            CheckInBody,
            CheckOutBody,
            CheckOutResponse,
            AttendanceSummary,
            Customer,
            CreateCustomer,
            Product,
            CreateProduct,
            LineItem,
            Totals,
            QuotationStatus,
            Quotation,
            CreateQuotation,
            QuotationStatusBody,
            ConvertBody,
            QuotationListResponse,
            InvoiceStatus,
            Invoice,
            CreateInvoice,
            InvoiceStatusBody,
            InvoiceListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign-in, tokens and own profile"),
        (name = "Users", description = "User account management"),
        (name = "Policy", description = "Department attendance and leave policies"),
        (name = "Leave", description = "Leave requests and approvals"),
        (name = "Attendance", description = "Check-in, check-out and monthly records"),
        (name = "Billing", description = "Customers, products, quotations and invoices"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme the handlers reference.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/api/leave/{leave_id}/escalate",
            "/api/attendance/summary",
            "/api/quotations/{id}/convert",
            "/api/invoices/{id}/status",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = doc.components.expect("components").security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }
}
